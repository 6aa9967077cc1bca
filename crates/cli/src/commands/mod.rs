pub mod profile;
pub mod report;
pub mod rules;
pub mod status;
