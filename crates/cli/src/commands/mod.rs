pub mod clusters;
pub mod incident;
pub mod scan;
pub mod settings;
