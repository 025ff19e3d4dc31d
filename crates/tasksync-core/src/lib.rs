//! tasksync-core - Domain logic shared by every sync-core crate
//!
//! This crate contains the hexagonal architecture core with:
//! - **Domain entities** - `Task`, `SyncItem`, `IdMapping`, `ItemChange`, `SyncConflict`
//! - **Port definitions** - `BackendAdapter`, the interface every task backend implements
//! - **Configuration** - `SyncConfig`, the recognized sync configuration surface
//! - **Error taxonomy** - `SyncError`, the tagged error surface engines report through
//!
//! # Architecture
//!
//! This crate follows the hexagonal (ports & adapters) architecture
//! pattern. The domain module contains pure business logic with no
//! external dependencies. Ports define trait interfaces that backend
//! adapters implement outside this crate; the core never constructs one.

pub mod config;
pub mod domain;
pub mod errors;
pub mod ports;
