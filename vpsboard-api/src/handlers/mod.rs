pub mod dashboard;
pub mod instances;
pub mod logs;
pub mod resources;
pub mod snapshots;
