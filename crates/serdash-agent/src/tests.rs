//! Тесты агента: ключи и токены, каталог состояния, разбор вывода системных утилит.

#[cfg(test)]
mod tests {
    use crate::auth::{AgentClaims, AgentIdentity, PRIVATE_KEY_FILE, PUBLIC_KEY_FILE, TOKEN_TTL};
    use crate::collect::{
        cpu_usage_between, parse_cpu_times, parse_df, parse_ip_addr_json, parse_loadavg,
        parse_meminfo, parse_ss_connections, parse_ss_listening, parse_thermal_millidegrees,
        Connection, ListeningPort, MemoryUsage, Snapshot,
    };
    use crate::config::{AgentState, AGENT_ID_FILE};
    use crate::error::AgentError;
    use ed25519_dalek::pkcs8::spki::DecodePublicKey;
    use ed25519_dalek::VerifyingKey;
    use jsonwebtoken::Algorithm;
    use std::fs;

    // ── Ключи и токены ────────────────────────────────────────────────────────

    #[test]
    fn test_load_or_create_persists_identity() {
        let dir = tempfile::tempdir().unwrap();

        let first = AgentIdentity::load_or_create(dir.path()).unwrap();
        let second = AgentIdentity::load_or_create(dir.path()).unwrap();

        assert_eq!(
            first.public_key_pem().unwrap(),
            second.public_key_pem().unwrap(),
            "Повторная загрузка должна вернуть тот же ключ"
        );
        let stored = fs::read_to_string(dir.path().join(PUBLIC_KEY_FILE)).unwrap();
        assert_eq!(stored, first.public_key_pem().unwrap());
    }

    #[test]
    fn test_missing_public_key_is_restored_from_private() {
        let dir = tempfile::tempdir().unwrap();
        let original = AgentIdentity::load_or_create(dir.path()).unwrap();
        let private_before = fs::read_to_string(dir.path().join(PRIVATE_KEY_FILE)).unwrap();
        fs::remove_file(dir.path().join(PUBLIC_KEY_FILE)).unwrap();

        let reloaded = AgentIdentity::load_or_create(dir.path()).unwrap();

        assert_eq!(
            reloaded.public_key_pem().unwrap(),
            original.public_key_pem().unwrap(),
            "Зарегистрированный ключ не должен меняться"
        );
        assert_eq!(
            fs::read_to_string(dir.path().join(PRIVATE_KEY_FILE)).unwrap(),
            private_before
        );
        assert_eq!(
            fs::read_to_string(dir.path().join(PUBLIC_KEY_FILE)).unwrap(),
            original.public_key_pem().unwrap()
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_key_files_are_private() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        AgentIdentity::load_or_create(dir.path()).unwrap();

        for name in [PRIVATE_KEY_FILE, PUBLIC_KEY_FILE] {
            let mode = fs::metadata(dir.path().join(name)).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600, "{name} должен быть доступен только владельцу");
        }
    }

    #[test]
    fn test_public_key_pem_is_spki() {
        let identity = AgentIdentity::from_seed([7u8; 32]);
        let pem = identity.public_key_pem().unwrap();

        assert!(pem.starts_with("-----BEGIN PUBLIC KEY-----"));
        assert!(pem.trim_end().ends_with("-----END PUBLIC KEY-----"));
    }

    #[test]
    fn test_sign_token_has_eddsa_header_and_claims() {
        let identity = AgentIdentity::from_seed([7u8; 32]);
        let token = identity.sign_token(42, TOKEN_TTL).unwrap();

        let header = jsonwebtoken::decode_header(&token).unwrap();
        assert_eq!(header.alg, Algorithm::EdDSA);

        let verifying =
            VerifyingKey::from_public_key_pem(&identity.public_key_pem().unwrap()).unwrap();
        let key = jsonwebtoken::DecodingKey::from_ed_der(verifying.as_bytes());
        let validation = jsonwebtoken::Validation::new(Algorithm::EdDSA);
        let data = jsonwebtoken::decode::<AgentClaims>(&token, &key, &validation).unwrap();

        assert_eq!(data.claims.agent_id, 42);
        assert_eq!(data.claims.exp - data.claims.iat, 300);
    }

    // ── Каталог состояния ─────────────────────────────────────────────────────

    #[test]
    fn test_registration_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let state = AgentState::new(dir.path().join("nested"));

        assert!(matches!(state.agent_id(), Err(AgentError::NotRegistered)));
        assert_eq!(state.collector_url(), None);

        state.save_registration(7, "http://collector:3001/").unwrap();

        assert_eq!(state.agent_id().unwrap(), 7);
        assert_eq!(state.collector_url().as_deref(), Some("http://collector:3001"));
    }

    #[test]
    fn test_corrupted_agent_id_means_not_registered() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(AGENT_ID_FILE), "abc").unwrap();

        let state = AgentState::new(dir.path());
        assert!(matches!(state.agent_id(), Err(AgentError::NotRegistered)));
    }

    // ── Разбор вывода системных утилит ────────────────────────────────────────

    #[test]
    fn test_parse_df_skips_pseudo_and_small_filesystems() {
        let output = "\
Filesystem     Type      Mounted on        1B-blocks        Avail
/dev/sda1      ext4      /              105089261568  52544630784
tmpfs          tmpfs     /run              838860800    838000000
/dev/sda15     vfat      /boot/efi         109422592     99000000
overlay        overlay   none           105089261568  52544630784
/dev/loop0     squashfs  /snap/core         58327040            0
";
        let disks = parse_df(output);

        assert_eq!(
            disks.iter().map(|d| d.mount_point.as_str()).collect::<Vec<_>>(),
            vec!["/", "/run", "/boot/efi"]
        );
        assert_eq!(disks[0].total_bytes, 105_089_261_568);
        assert_eq!(disks[0].free_bytes, 52_544_630_784);
    }

    #[test]
    fn test_parse_meminfo_uses_available() {
        let text = "MemTotal:       16000000 kB\nMemFree:         2000000 kB\nMemAvailable:    6000000 kB\n";
        let memory = parse_meminfo(text);

        assert_eq!(memory.total_bytes, Some(16_000_000 * 1024));
        assert_eq!(memory.free_bytes, Some(6_000_000 * 1024));
        assert_eq!(memory.used_bytes, Some(10_000_000 * 1024));
    }

    #[test]
    fn test_parse_meminfo_without_total() {
        let memory = parse_meminfo("MemFree: 100 kB\n");
        assert_eq!(memory.total_bytes, None);
        assert_eq!(memory.used_bytes, None);
        assert_eq!(memory.free_bytes, Some(102_400));
    }

    #[test]
    fn test_parse_loadavg() {
        assert_eq!(
            parse_loadavg("0.52 0.58 0.59 1/467 12345\n"),
            Some([0.52, 0.58, 0.59])
        );
        assert_eq!(parse_loadavg("garbage"), None);
    }

    #[test]
    fn test_cpu_usage_from_two_samples() {
        let first = parse_cpu_times("cpu  100 0 100 700 100 0 0 0 0 0\ncpu0 1 2 3 4\n").unwrap();
        let second = parse_cpu_times("cpu  150 0 150 850 150 0 0 0 0 0\n").unwrap();

        assert_eq!(first, (800, 1000));
        // всего +300, простой +200
        assert_eq!(cpu_usage_between(first, second), Some(33.3));
        assert_eq!(cpu_usage_between(second, second), None);
    }

    #[test]
    fn test_parse_thermal() {
        assert_eq!(parse_thermal_millidegrees("45000\n"), Some(45.0));
        assert_eq!(parse_thermal_millidegrees(""), None);
    }

    #[test]
    fn test_parse_ip_addr_json() {
        let output = r#"[
            {"ifindex":1,"ifname":"lo","operstate":"UNKNOWN","addr_info":[{"family":"inet","local":"127.0.0.1"},{"family":"inet6","local":"::1"}]},
            {"ifindex":2,"ifname":"eth0","operstate":"UP","addr_info":[{"family":"inet","local":"10.0.0.5"}]},
            {"ifindex":3,"ifname":"wlan0"}
        ]"#;
        let interfaces = parse_ip_addr_json(output);

        assert_eq!(interfaces.len(), 3);
        assert_eq!(interfaces[0].ip_addresses, vec!["127.0.0.1", "::1"]);
        assert_eq!(interfaces[1].status, "up");
        assert_eq!(interfaces[2].status, "unknown");
        assert!(interfaces[2].ip_addresses.is_empty());
        assert!(parse_ip_addr_json("not json").is_empty());
    }

    #[test]
    fn test_parse_ss_listening() {
        let output = "\
Netid State  Recv-Q Send-Q Local Address:Port Peer Address:Port
udp   UNCONN 0      0      127.0.0.53%lo:53        0.0.0.0:*
tcp   LISTEN 0      4096         0.0.0.0:22        0.0.0.0:*
tcp   LISTEN 0      511             [::]:80           [::]:*
tcp   LISTEN 0      511             [::]:bad          [::]:*
";
        let ports = parse_ss_listening(output);

        assert_eq!(
            ports,
            vec![
                ListeningPort { protocol: "udp".into(), port: 53 },
                ListeningPort { protocol: "tcp".into(), port: 22 },
                ListeningPort { protocol: "tcp".into(), port: 80 },
            ]
        );
    }

    #[test]
    fn test_parse_ss_connections() {
        let output = "\
Netid State Recv-Q Send-Q Local Address:Port Peer Address:Port
tcp   ESTAB 0      0      10.0.0.5:22        10.0.0.1:51234
tcp   short line
";
        let connections = parse_ss_connections(output);

        assert_eq!(
            connections,
            vec![Connection {
                local_addr: "10.0.0.5:22".into(),
                remote_addr: "10.0.0.1:51234".into(),
                state: "ESTAB".into(),
            }]
        );
    }

    #[test]
    fn test_snapshot_serializes_as_metrics_batch() {
        let snapshot = Snapshot {
            sampled_at: "2024-01-01T00:00:00+00:00".into(),
            memory: MemoryUsage {
                total_bytes: Some(1),
                ..Default::default()
            },
            ..Default::default()
        };
        let value = serde_json::to_value(&snapshot).unwrap();

        assert_eq!(value["memory"], serde_json::json!({"total_bytes": 1}));
        assert!(value["disk"].as_array().unwrap().is_empty());
        assert!(value.get("listening_ports").is_some());
    }
}
