//! Infrastructure layer: persistence, external collaborators and the
//! background workflows built on them.

pub mod archival;
pub mod collaborators;
pub mod db;
pub mod finalize;
pub mod jobs;
pub mod units;
