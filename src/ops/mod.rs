//! Built-in filter steps.
//!
//! Every step here reads from the scoped snapshot it is handed and writes
//! only inside the requested rectangle.

pub mod adjustments;
pub mod filters;

use std::sync::Arc;

use crate::filter::FilterStep;

/// One instance of every built-in step, for [`crate::filter::FilterRegistry::with_builtins`].
pub fn builtin_steps() -> Vec<Arc<dyn FilterStep>> {
    vec![
        Arc::new(adjustments::InvertColors),
        Arc::new(adjustments::Desaturate),
        Arc::new(adjustments::BrightnessContrast),
        Arc::new(adjustments::Threshold),
        Arc::new(filters::GaussianBlur),
    ]
}
