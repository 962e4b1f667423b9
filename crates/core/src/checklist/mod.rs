//! Clinical checklist engine: versioned form templates, conditional
//! visibility, answer validation, CDS alerts and instance lifecycle.

pub mod cds;
pub mod condition;
pub mod controller;
pub mod instance;
pub mod notes;
pub mod progress;
pub mod template;
pub mod validator;
pub mod value;
pub mod versioning;
