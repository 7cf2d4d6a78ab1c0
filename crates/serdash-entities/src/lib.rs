//! Сущности sea-orm для реестра агентов и временных рядов метрик.

pub mod connection_samples;
pub mod cpu_samples;
pub mod disk_samples;
pub mod listening_port_samples;
pub mod memory_samples;
pub mod network_interface_samples;
pub mod registration_codes;
pub mod servers;
