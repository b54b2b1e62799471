// ============================================================================
// FILTERS — configurations, the step contract and the registry
// ============================================================================
//
// A filter step mutates a buffer in place over one rectangle.  Steps never
// read pixels they have already written: every read goes through the
// `BufferSnapshot` taken just before the step runs, which is dropped as soon
// as the step returns.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use image::{Rgba, RgbaImage};
use serde::{Deserialize, Serialize};

use crate::error::MergeResult;
use crate::geometry::Rect;
use crate::tiles::PixelBuffer;

/// A single named parameter value.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum ParamValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Bool(v) => write!(f, "{v}"),
            ParamValue::Int(v) => write!(f, "{v}"),
            ParamValue::Float(v) => write!(f, "{v}"),
            ParamValue::Text(v) => f.write_str(v),
        }
    }
}

impl From<bool> for ParamValue {
    fn from(v: bool) -> Self {
        ParamValue::Bool(v)
    }
}

impl From<i64> for ParamValue {
    fn from(v: i64) -> Self {
        ParamValue::Int(v)
    }
}

impl From<f64> for ParamValue {
    fn from(v: f64) -> Self {
        ParamValue::Float(v)
    }
}

impl From<&str> for ParamValue {
    fn from(v: &str) -> Self {
        ParamValue::Text(v.to_string())
    }
}

impl ParamValue {
    /// Parse a command-line value: `true`/`false`, integers, floats, and
    /// anything else as text.
    pub fn parse(raw: &str) -> Self {
        if let Ok(v) = raw.parse::<bool>() {
            return ParamValue::Bool(v);
        }
        if let Ok(v) = raw.parse::<i64>() {
            return ParamValue::Int(v);
        }
        if let Ok(v) = raw.parse::<f64>() {
            return ParamValue::Float(v);
        }
        ParamValue::Text(raw.to_string())
    }
}

/// Named parameters for one filter, identified by the filter's id.
///
/// Owned by an adjustment layer and read-only while a merge runs.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FilterConfiguration {
    name: String,
    version: u32,
    params: BTreeMap<String, ParamValue>,
}

impl FilterConfiguration {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), version: 1, params: BTreeMap::new() }
    }

    /// Builder form of [`FilterConfiguration::set`].
    pub fn with(mut self, key: &str, value: impl Into<ParamValue>) -> Self {
        self.set(key, value);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn set(&mut self, key: &str, value: impl Into<ParamValue>) {
        self.params.insert(key.to_string(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&ParamValue> {
        self.params.get(key)
    }

    pub fn params(&self) -> impl Iterator<Item = (&str, &ParamValue)> {
        self.params.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Numeric parameter, accepting ints and floats.
    pub fn get_f64(&self, key: &str, default: f64) -> f64 {
        match self.params.get(key) {
            Some(ParamValue::Float(v)) => *v,
            Some(ParamValue::Int(v)) => *v as f64,
            _ => default,
        }
    }

    pub fn get_int(&self, key: &str, default: i64) -> i64 {
        match self.params.get(key) {
            Some(ParamValue::Int(v)) => *v,
            Some(ParamValue::Float(v)) => v.round() as i64,
            _ => default,
        }
    }

    pub fn get_bool(&self, key: &str, default: bool) -> bool {
        match self.params.get(key) {
            Some(ParamValue::Bool(v)) => *v,
            _ => default,
        }
    }

    pub fn to_bytes(&self) -> MergeResult<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> MergeResult<Self> {
        Ok(bincode::deserialize(bytes)?)
    }
}

/// Read-only view of a buffer as it was just before a filter step ran.
///
/// Shares chunk storage with the live buffer; only chunks the step writes to
/// are actually copied.
pub struct BufferSnapshot {
    buffer: PixelBuffer,
}

impl BufferSnapshot {
    pub fn capture(buffer: &PixelBuffer) -> Self {
        Self { buffer: buffer.snapshot() }
    }

    #[inline]
    pub fn pixel(&self, x: i32, y: i32) -> Rgba<u8> {
        self.buffer.pixel(x, y)
    }

    pub fn read_rect(&self, rect: Rect) -> RgbaImage {
        self.buffer.read_rect(rect)
    }

    pub fn extent(&self) -> Rect {
        self.buffer.extent()
    }
}

/// One filter algorithm.  Implementations write only inside `rect` and read
/// only from `before`.
pub trait FilterStep: Send + Sync {
    /// Stable id matched against [`FilterConfiguration::name`].
    fn id(&self) -> &str;

    fn process(&self, buffer: &mut PixelBuffer, rect: Rect, config: &FilterConfiguration, before: &BufferSnapshot);
}

/// Run `step` over `rect` of `buffer` inside a scoped snapshot.
pub fn apply_filter(step: &dyn FilterStep, buffer: &mut PixelBuffer, rect: Rect, config: &FilterConfiguration) {
    if rect.is_empty() {
        return;
    }
    let before = BufferSnapshot::capture(buffer);
    tracing::trace!(filter = step.id(), ?rect, "applying filter");
    step.process(buffer, rect, config, &before);
    drop(before);
}

/// Filter lookup by id.
#[derive(Clone, Default)]
pub struct FilterRegistry {
    steps: HashMap<String, Arc<dyn FilterStep>>,
}

impl fmt::Debug for FilterRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilterRegistry").field("ids", &self.ids()).finish()
    }
}

impl FilterRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding every built-in filter from [`crate::ops`].
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        for step in crate::ops::builtin_steps() {
            registry.register(step);
        }
        registry
    }

    /// Add a step, replacing any previous step with the same id.
    pub fn register(&mut self, step: Arc<dyn FilterStep>) {
        self.steps.insert(step.id().to_string(), step);
    }

    pub fn resolve(&self, name: &str) -> Option<Arc<dyn FilterStep>> {
        self.steps.get(name).cloned()
    }

    /// Registered ids, sorted.
    pub fn ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.steps.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }
}
