//! Concrete flag kinds.
//!
//! Every kind is a [`TypedFlag<T>`] where `T` implements [`FlagValue`]. The
//! holder owns the compiled-in default, the current value and the is-set
//! mark; `T` only knows how to absorb a raw token and render itself.
//!
//! # Examples
//!
//! ```
//! use std::sync::Arc;
//! use argtree_core::{Flag, IntFlag, SliceFlag, StringFlag};
//!
//! let format = StringFlag::new("format", "json").with_short("f");
//! assert_eq!(format.value(), "json");
//! format.set("yaml").unwrap();
//! assert!(format.is_set());
//!
//! let port = Arc::new(IntFlag::new("port", 8080));
//! assert!(port.set("eighty").is_err());
//! assert_eq!(port.value(), 8080);
//!
//! let tags = SliceFlag::new("tag", vec!["default".to_string()]);
//! tags.set("a,b").unwrap();
//! tags.set("c").unwrap();
//! assert_eq!(tags.value(), vec!["a", "b", "c"]);
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::num::IntErrorKind;
use std::sync::{PoisonError, RwLock};
use std::time::Duration;

use crate::error::ValueError;
use crate::flag::{Flag, FlagInfo, ValueKind};

/// A value type that can be assigned from command-line text.
pub trait FlagValue: Clone + Send + Sync + 'static {
    /// Kind tag reported through [`FlagInfo::kind`].
    const KIND: ValueKind;

    /// Absorbs `raw` into `self`.
    ///
    /// `replace` is `true` for the first assignment after construction or
    /// reset. Scalar kinds overwrite regardless; repeatable kinds drop the
    /// compiled-in default on the first assignment and append afterwards.
    fn apply(&mut self, raw: &str, replace: bool) -> Result<(), ValueError>;

    /// Renders the value as text.
    fn render(&self) -> String;
}

#[derive(Debug)]
struct Slot<T> {
    value: T,
    set: bool,
}

/// Generic flag holding a value of type `T`.
#[derive(Debug)]
pub struct TypedFlag<T: FlagValue> {
    info: FlagInfo,
    default: T,
    slot: RwLock<Slot<T>>,
}

/// Free-form string flag.
pub type StringFlag = TypedFlag<String>;
/// Boolean switch.
pub type BoolFlag = TypedFlag<bool>;
/// Signed integer flag.
pub type IntFlag = TypedFlag<i64>;
/// Unsigned integer flag.
pub type UintFlag = TypedFlag<u64>;
/// Floating point flag.
pub type FloatFlag = TypedFlag<f64>;
/// Duration flag (`90s`, `1h30m`).
pub type DurationFlag = TypedFlag<Duration>;
/// Byte-size flag (`512`, `10KB`, `4MiB`).
pub type SizeFlag = TypedFlag<ByteSize>;
/// Repeatable string list flag.
pub type SliceFlag = TypedFlag<Vec<String>>;
/// Repeatable `key=value` flag.
pub type MapFlag = TypedFlag<BTreeMap<String, String>>;
/// Flag restricted to a fixed set of choices.
pub type EnumFlag = TypedFlag<Choice>;

impl<T: FlagValue> TypedFlag<T> {
    /// Creates a flag with a long name and a compiled-in default.
    pub fn new(long: impl Into<String>, default: impl Into<T>) -> Self {
        let default = default.into();
        Self {
            info: FlagInfo::new(long, T::KIND),
            slot: RwLock::new(Slot {
                value: default.clone(),
                set: false,
            }),
            default,
        }
    }

    /// Sets the short name.
    pub fn with_short(mut self, short: impl Into<String>) -> Self {
        self.info.short = short.into();
        self
    }

    /// Sets the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.info.description = description.into();
        self
    }

    /// Binds the flag to an explicit environment variable.
    pub fn with_env(mut self, var: impl Into<String>) -> Self {
        self.info.env = Some(var.into());
        self
    }

    /// Returns a copy of the current value.
    pub fn value(&self) -> T {
        self.slot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .value
            .clone()
    }

    /// Returns the compiled-in default.
    pub fn default_value(&self) -> &T {
        &self.default
    }
}

impl TypedFlag<Choice> {
    /// Creates an enum flag, validating the allowed list and the default.
    ///
    /// # Errors
    ///
    /// Returns [`ValueError::Definition`] when `allowed` is empty, contains
    /// empty or duplicate entries, or when `default` is non-empty and not in
    /// `allowed`.
    pub fn choice(
        long: impl Into<String>,
        allowed: &[&str],
        default: &str,
    ) -> Result<Self, ValueError> {
        Ok(Self::new(long, Choice::new(allowed, default)?))
    }

    /// The currently selected choice, empty when none.
    pub fn selected(&self) -> String {
        self.value().selected
    }
}

impl<T: FlagValue> Flag for TypedFlag<T> {
    fn info(&self) -> &FlagInfo {
        &self.info
    }

    fn set(&self, raw: &str) -> Result<(), ValueError> {
        let mut slot = self.slot.write().unwrap_or_else(PoisonError::into_inner);
        let mut next = slot.value.clone();
        next.apply(raw, !slot.set)?;
        slot.value = next;
        slot.set = true;
        Ok(())
    }

    fn is_set(&self) -> bool {
        self.slot.read().unwrap_or_else(PoisonError::into_inner).set
    }

    fn reset(&self) {
        let mut slot = self.slot.write().unwrap_or_else(PoisonError::into_inner);
        slot.value = self.default.clone();
        slot.set = false;
    }

    fn value_string(&self) -> String {
        self.slot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .value
            .render()
    }

    fn default_string(&self) -> String {
        self.default.render()
    }
}

fn syntax(input: &str, expected: &'static str) -> ValueError {
    ValueError::Syntax {
        input: input.to_string(),
        expected,
    }
}

impl FlagValue for String {
    const KIND: ValueKind = ValueKind::String;

    fn apply(&mut self, raw: &str, _replace: bool) -> Result<(), ValueError> {
        *self = raw.to_string();
        Ok(())
    }

    fn render(&self) -> String {
        self.clone()
    }
}

impl FlagValue for bool {
    const KIND: ValueKind = ValueKind::Bool;

    fn apply(&mut self, raw: &str, _replace: bool) -> Result<(), ValueError> {
        *self = match raw.trim().to_ascii_lowercase().as_str() {
            "" | "true" | "t" | "1" | "yes" | "y" | "on" => true,
            "false" | "f" | "0" | "no" | "n" | "off" => false,
            _ => return Err(syntax(raw, "boolean")),
        };
        Ok(())
    }

    fn render(&self) -> String {
        self.to_string()
    }
}

fn int_error(raw: &str, kind: &IntErrorKind, expected: &'static str) -> ValueError {
    match kind {
        IntErrorKind::PosOverflow | IntErrorKind::NegOverflow => {
            ValueError::OutOfRange(raw.to_string())
        }
        _ => syntax(raw, expected),
    }
}

impl FlagValue for i64 {
    const KIND: ValueKind = ValueKind::Int;

    fn apply(&mut self, raw: &str, _replace: bool) -> Result<(), ValueError> {
        *self = raw
            .trim()
            .parse()
            .map_err(|e: std::num::ParseIntError| int_error(raw, e.kind(), "integer"))?;
        Ok(())
    }

    fn render(&self) -> String {
        self.to_string()
    }
}

impl FlagValue for u64 {
    const KIND: ValueKind = ValueKind::Uint;

    fn apply(&mut self, raw: &str, _replace: bool) -> Result<(), ValueError> {
        *self = raw.trim().parse().map_err(|e: std::num::ParseIntError| {
            int_error(raw, e.kind(), "unsigned integer")
        })?;
        Ok(())
    }

    fn render(&self) -> String {
        self.to_string()
    }
}

impl FlagValue for f64 {
    const KIND: ValueKind = ValueKind::Float;

    fn apply(&mut self, raw: &str, _replace: bool) -> Result<(), ValueError> {
        let parsed: f64 = raw.trim().parse().map_err(|_| syntax(raw, "number"))?;
        if !parsed.is_finite() {
            return Err(ValueError::OutOfRange(raw.to_string()));
        }
        *self = parsed;
        Ok(())
    }

    fn render(&self) -> String {
        self.to_string()
    }
}

const DURATION_UNITS: &[(&str, u64)] = &[
    ("ns", 1),
    ("us", 1_000),
    ("µs", 1_000),
    ("ms", 1_000_000),
    ("s", 1_000_000_000),
    ("m", 60_000_000_000),
    ("h", 3_600_000_000_000),
    ("d", 86_400_000_000_000),
];

/// Parses durations like `90s`, `1h30m`, `1.5h` or `250ms`. A bare `0` is
/// accepted; any other number needs a unit.
pub fn parse_duration(raw: &str) -> Result<Duration, ValueError> {
    let text = raw.trim();
    if text == "0" {
        return Ok(Duration::ZERO);
    }
    if text.is_empty() {
        return Err(syntax(raw, "duration"));
    }

    let mut total_nanos: u64 = 0;
    let mut rest = text;
    while !rest.is_empty() {
        let number_len = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .ok_or_else(|| syntax(raw, "duration"))?;
        if number_len == 0 {
            return Err(syntax(raw, "duration"));
        }
        let number = &rest[..number_len];
        rest = &rest[number_len..];

        let unit_len = rest
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(rest.len());
        let unit = &rest[..unit_len];
        let scale = DURATION_UNITS
            .iter()
            .find(|(name, _)| *name == unit)
            .map(|(_, scale)| *scale)
            .ok_or_else(|| syntax(raw, "duration"))?;
        rest = &rest[unit_len..];

        let nanos = match number.parse::<u64>() {
            Ok(whole) => whole.checked_mul(scale),
            Err(_) => {
                let fractional: f64 = number.parse().map_err(|_| syntax(raw, "duration"))?;
                let nanos = (fractional * scale as f64).round();
                (nanos < u64::MAX as f64).then_some(nanos as u64)
            }
        };
        total_nanos = nanos
            .and_then(|n| total_nanos.checked_add(n))
            .ok_or_else(|| ValueError::OutOfRange(raw.to_string()))?;
    }

    Ok(Duration::from_nanos(total_nanos))
}

/// Renders a duration compactly, e.g. `1h30m`, `2s500ms`, `0s`.
pub fn format_duration(duration: Duration) -> String {
    if duration.is_zero() {
        return "0s".to_string();
    }
    let mut secs = duration.as_secs();
    let mut out = String::new();
    for (unit, size) in [("d", 86400u64), ("h", 3600), ("m", 60)] {
        if secs >= size {
            out.push_str(&format!("{}{unit}", secs / size));
            secs %= size;
        }
    }
    if secs > 0 {
        out.push_str(&format!("{secs}s"));
    }
    let nanos = duration.subsec_nanos();
    if nanos > 0 {
        if nanos % 1_000_000 == 0 {
            out.push_str(&format!("{}ms", nanos / 1_000_000));
        } else if nanos % 1_000 == 0 {
            out.push_str(&format!("{}us", nanos / 1_000));
        } else {
            out.push_str(&format!("{nanos}ns"));
        }
    }
    out
}

impl FlagValue for Duration {
    const KIND: ValueKind = ValueKind::Duration;

    fn apply(&mut self, raw: &str, _replace: bool) -> Result<(), ValueError> {
        *self = parse_duration(raw)?;
        Ok(())
    }

    fn render(&self) -> String {
        format_duration(*self)
    }
}

/// Number of bytes, parsed from strings such as `512`, `10KB` or `4MiB`.
///
/// Decimal suffixes (`K`, `KB`, `M`, ...) are powers of 1000, binary suffixes
/// (`KiB`, `MiB`, ...) powers of 1024. Suffixes are case-insensitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct ByteSize(pub u64);

impl ByteSize {
    /// Number of bytes.
    pub fn bytes(&self) -> u64 {
        self.0
    }
}

impl From<u64> for ByteSize {
    fn from(bytes: u64) -> Self {
        ByteSize(bytes)
    }
}

const SIZE_UNITS: &[(&str, u64)] = &[
    ("", 1),
    ("b", 1),
    ("k", 1_000),
    ("kb", 1_000),
    ("kib", 1 << 10),
    ("m", 1_000_000),
    ("mb", 1_000_000),
    ("mib", 1 << 20),
    ("g", 1_000_000_000),
    ("gb", 1_000_000_000),
    ("gib", 1 << 30),
    ("t", 1_000_000_000_000),
    ("tb", 1_000_000_000_000),
    ("tib", 1 << 40),
];

impl std::str::FromStr for ByteSize {
    type Err = ValueError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let text = raw.trim();
        let split = text
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(text.len());
        let (number, unit) = text.split_at(split);
        if number.is_empty() {
            return Err(syntax(raw, "byte size"));
        }
        let unit = unit.trim().to_ascii_lowercase();
        let scale = SIZE_UNITS
            .iter()
            .find(|(name, _)| *name == unit)
            .map(|(_, scale)| *scale)
            .ok_or_else(|| syntax(raw, "byte size"))?;

        if let Ok(whole) = number.parse::<u64>() {
            return whole
                .checked_mul(scale)
                .map(ByteSize)
                .ok_or_else(|| ValueError::OutOfRange(raw.to_string()));
        }
        let fractional: f64 = number.parse().map_err(|_| syntax(raw, "byte size"))?;
        let bytes = fractional * scale as f64;
        if bytes > u64::MAX as f64 {
            return Err(ValueError::OutOfRange(raw.to_string()));
        }
        Ok(ByteSize(bytes.round() as u64))
    }
}

impl fmt::Display for ByteSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (unit, size) in [("TiB", 1u64 << 40), ("GiB", 1 << 30), ("MiB", 1 << 20), ("KiB", 1 << 10)] {
            if self.0 >= size && self.0 % size == 0 {
                return write!(f, "{}{unit}", self.0 / size);
            }
        }
        write!(f, "{}", self.0)
    }
}

impl FlagValue for ByteSize {
    const KIND: ValueKind = ValueKind::Size;

    fn apply(&mut self, raw: &str, _replace: bool) -> Result<(), ValueError> {
        *self = raw.parse()?;
        Ok(())
    }

    fn render(&self) -> String {
        self.to_string()
    }
}

impl FlagValue for Vec<String> {
    const KIND: ValueKind = ValueKind::Slice;

    fn apply(&mut self, raw: &str, replace: bool) -> Result<(), ValueError> {
        if replace {
            self.clear();
        }
        self.extend(raw.split(',').filter(|s| !s.is_empty()).map(String::from));
        Ok(())
    }

    fn render(&self) -> String {
        self.join(",")
    }
}

impl FlagValue for BTreeMap<String, String> {
    const KIND: ValueKind = ValueKind::Map;

    fn apply(&mut self, raw: &str, replace: bool) -> Result<(), ValueError> {
        let mut parsed = Vec::new();
        for pair in raw.split(',').filter(|s| !s.is_empty()) {
            let (key, value) = pair
                .split_once('=')
                .filter(|(key, _)| !key.is_empty())
                .ok_or_else(|| syntax(raw, "key=value pairs"))?;
            parsed.push((key.to_string(), value.to_string()));
        }
        if replace {
            self.clear();
        }
        self.extend(parsed);
        Ok(())
    }

    fn render(&self) -> String {
        self.iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// Selected value out of a fixed set of allowed choices.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Choice {
    allowed: Vec<String>,
    selected: String,
}

impl Choice {
    /// Creates a choice set with an optional default (`""` for none).
    ///
    /// # Errors
    ///
    /// Returns [`ValueError::Definition`] for an empty or duplicated allowed
    /// list, empty entries, or a default outside the list.
    pub fn new(allowed: &[&str], default: &str) -> Result<Self, ValueError> {
        if allowed.is_empty() {
            return Err(ValueError::Definition(
                "enum flag needs at least one allowed value".to_string(),
            ));
        }
        let mut seen = std::collections::HashSet::new();
        for value in allowed {
            if value.is_empty() {
                return Err(ValueError::Definition(
                    "enum allowed values cannot be empty".to_string(),
                ));
            }
            if !seen.insert(*value) {
                return Err(ValueError::Definition(format!(
                    "duplicate allowed value '{value}'"
                )));
            }
        }
        if !default.is_empty() && !allowed.contains(&default) {
            return Err(ValueError::Definition(format!(
                "default '{default}' is not an allowed value"
            )));
        }
        Ok(Self {
            allowed: allowed.iter().map(|s| s.to_string()).collect(),
            selected: default.to_string(),
        })
    }

    /// The allowed values, in declaration order.
    pub fn allowed(&self) -> &[String] {
        &self.allowed
    }

    /// The selected value, empty when none.
    pub fn selected(&self) -> &str {
        &self.selected
    }
}

impl FlagValue for Choice {
    const KIND: ValueKind = ValueKind::Enum;

    fn apply(&mut self, raw: &str, _replace: bool) -> Result<(), ValueError> {
        if !self.allowed.iter().any(|a| a == raw) {
            return Err(ValueError::NotAllowed {
                input: raw.to_string(),
                allowed: self.allowed.clone(),
            });
        }
        self.selected = raw.to_string();
        Ok(())
    }

    fn render(&self) -> String {
        self.selected.clone()
    }
}
