//! Hand-written sea-orm entities mirroring the `migration` crate's tables.
//! `generate-entities` (migration/bin/generate_entities.rs) would normally
//! produce these from a live schema via `sea-orm-cli`; absent that tooling
//! here they're written directly in the inline
//! `#[derive(DeriveEntityModel)]` shape the teacher uses for its own
//! hand-maintained `domain` table.

pub mod blocks_raw;
pub mod denom_metadata;
pub mod events_main;
pub mod messages_main;
pub mod progress;
pub mod transactions_main;
pub mod transactions_raw;
