pub mod adapt;
pub mod browser;
pub mod cli;
pub mod detector;
pub mod element;
pub mod observer;
pub mod trace;

pub use adapt::engine::{AdaptationConfig, AdaptationEngine};
pub use adapt::history::{AdaptationStats, AdaptationStrategy};
pub use browser::page::{ElementHandle, Page};
pub use detector::config::DetectionConfig;
pub use detector::error::DetectionError;
pub use detector::primary::PrimaryDetector;
pub use element::element_model::{DetectionResult, ElementType, InteractiveElement};
pub use observer::observer::{ElementObserver, ObserverError};
