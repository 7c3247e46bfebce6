//! Route handlers grouped by resource

pub mod alerts;
pub mod forecasts;
pub mod health;
pub mod nodes;
pub mod scaling;
