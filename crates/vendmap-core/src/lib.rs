pub mod app_config;
pub mod config;
pub mod filter;
pub mod geo;
pub mod machines;
pub mod validation;

use thiserror::Error;

pub use app_config::{AppConfig, Environment, ImageBounds};
pub use config::{load_app_config, load_app_config_from_env};
pub use filter::{derive_view, DerivedView, FilterState, StatusCounts};
pub use geo::{distance_km, format_distance, sort_by_distance, DistanceUnits, Located, Nearby};
pub use machines::{
    Category, Coordinate, ImagePatch, ImageRef, Machine, MachinePatch, NewMachine,
    OperatingStatus, PaymentMethod, UnknownVariant,
};
pub use validation::{sanitize_input, validate, MachineDraft, Validation, ValidationError};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("invalid value for {var}: {reason}")]
    InvalidEnvVar { var: String, reason: String },
}
