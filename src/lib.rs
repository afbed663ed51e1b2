//! `content-mesh`: the Deployment, Pointer-Commit & Synchronization
//! engine of a federated content-addressed repository (see
//! `SPEC_FULL.md`).

pub mod access;
pub mod analytics;
pub mod audit;
pub mod auth;
pub mod blacklist;
pub mod cache;
pub mod cluster;
pub mod config;
pub mod entity;
pub mod error;
pub mod failed;
pub mod hash;
pub mod history;
pub mod http;
pub mod pointers;
pub mod recovery;
pub mod service;
pub mod storage;
pub mod sync;
pub mod validation;
