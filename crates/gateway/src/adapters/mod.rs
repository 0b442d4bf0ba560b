//! Adapter implementations of the gateway ports

mod paper;
mod static_regime;

pub use paper::PaperBroker;
pub use static_regime::StaticRegimeSignal;
