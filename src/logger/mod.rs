//! Activity logging: JSONL append-only log fed by a dedicated logger thread.

pub mod activity;
pub mod jsonl;
