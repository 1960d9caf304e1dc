//! Typed variables and topics, the input of the grouping optimizer.
//!
//! A [`Variable`] names a typed scalar or array located at a device address.
//! Variables are usually produced by a [`VariableResolver`] from a symbolic
//! path; [`VariableTable`] is the simplest resolver, an exact-name lookup.
//!
//! Values move through plain little-endian bit streams (see
//! [`utils`](crate::utils)): element `i` of a variable occupies
//! `element_type.bits()` bits starting `i * element_type.bits()` bits after
//! the variable's own offset.
//!
//! # Example
//!
//! ```
//! use melsec_slmp::{Direction, ElementType, Topic, Variable, VariableTable};
//!
//! let mut table = VariableTable::new();
//! table.insert(Variable::scalar("speed", "D100".parse()?, ElementType::Real)?);
//! table.insert(Variable::new("lamps", "M0".parse()?, ElementType::Bool, vec![(0, 7)])?);
//!
//! let topic = Topic::resolve("panel", Direction::Read, &["speed", "lamps"], &table)?;
//! assert_eq!(topic.variables[1].len(), 8);
//! # Ok::<(), melsec_slmp::SlmpError>(())
//! ```

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::device::DeviceAddress;
use crate::error::{Result, SlmpError};
use crate::utils::{get_bits, set_bits};

/// Element type of a variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ElementType {
    /// 1-bit boolean.
    Bool,
    /// 16-bit signed integer.
    Int,
    /// 32-bit signed integer.
    DInt,
    /// 16-bit unsigned word.
    Word,
    /// 32-bit unsigned double word.
    DWord,
    /// 32-bit float.
    Real,
    /// 64-bit float.
    LReal,
}

impl ElementType {
    /// Width of one element in bits.
    pub fn bits(self) -> u32 {
        match self {
            ElementType::Bool => 1,
            ElementType::Int | ElementType::Word => 16,
            ElementType::DInt | ElementType::DWord | ElementType::Real => 32,
            ElementType::LReal => 64,
        }
    }

    /// Returns the zero value of this type.
    pub fn zero(self) -> Value {
        Value::from_raw(self, 0)
    }
}

impl fmt::Display for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ElementType::Bool => "BOOL",
            ElementType::Int => "INT",
            ElementType::DInt => "DINT",
            ElementType::Word => "WORD",
            ElementType::DWord => "DWORD",
            ElementType::Real => "REAL",
            ElementType::LReal => "LREAL",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for ElementType {
    type Err = SlmpError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "BOOL" => Ok(ElementType::Bool),
            "INT" => Ok(ElementType::Int),
            "DINT" => Ok(ElementType::DInt),
            "WORD" => Ok(ElementType::Word),
            "DWORD" => Ok(ElementType::DWord),
            "REAL" => Ok(ElementType::Real),
            "LREAL" => Ok(ElementType::LReal),
            _ => Err(SlmpError::invalid_parameter("element_type", format!("unknown type '{s}'"))),
        }
    }
}

/// A typed element value.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[allow(missing_docs)]
pub enum Value {
    Bool(bool),
    Int(i16),
    DInt(i32),
    Word(u16),
    DWord(u32),
    Real(f32),
    LReal(f64),
}

impl Value {
    /// Element type of this value.
    pub fn element_type(&self) -> ElementType {
        match self {
            Value::Bool(_) => ElementType::Bool,
            Value::Int(_) => ElementType::Int,
            Value::DInt(_) => ElementType::DInt,
            Value::Word(_) => ElementType::Word,
            Value::DWord(_) => ElementType::DWord,
            Value::Real(_) => ElementType::Real,
            Value::LReal(_) => ElementType::LReal,
        }
    }

    /// Raw bit pattern, right aligned.
    pub fn to_raw(&self) -> u64 {
        match *self {
            Value::Bool(v) => u64::from(v),
            Value::Int(v) => u64::from(v as u16),
            Value::DInt(v) => u64::from(v as u32),
            Value::Word(v) => u64::from(v),
            Value::DWord(v) => u64::from(v),
            Value::Real(v) => u64::from(v.to_bits()),
            Value::LReal(v) => v.to_bits(),
        }
    }

    /// Rebuilds a value from its raw bit pattern.
    pub fn from_raw(element_type: ElementType, raw: u64) -> Self {
        match element_type {
            ElementType::Bool => Value::Bool(raw & 1 != 0),
            ElementType::Int => Value::Int(raw as u16 as i16),
            ElementType::DInt => Value::DInt(raw as u32 as i32),
            ElementType::Word => Value::Word(raw as u16),
            ElementType::DWord => Value::DWord(raw as u32),
            ElementType::Real => Value::Real(f32::from_bits(raw as u32)),
            ElementType::LReal => Value::LReal(f64::from_bits(raw)),
        }
    }
}

macro_rules! impl_from_value {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for Value {
                fn from(v: $ty) -> Self {
                    Value::$variant(v)
                }
            }
        )*
    };
}

impl_from_value! {
    bool => Bool,
    i16 => Int,
    i32 => DInt,
    u16 => Word,
    u32 => DWord,
    f32 => Real,
    f64 => LReal,
}

fn element_count(dimension: &[(u32, u32)]) -> Option<u64> {
    dimension.iter().try_fold(1u64, |n, &(low, high)| {
        n.checked_mul(u64::from(high.checked_sub(low)?) + 1)
    })
}

/// A resolved, typed PLC variable.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Variable {
    /// Unique name, used to key read results and write values.
    pub name: String,
    /// Address of the first element.
    pub address: DeviceAddress,
    /// Type of every element.
    pub element_type: ElementType,
    /// Inclusive `(low, high)` bounds per dimension; empty for a scalar.
    pub dimension: Vec<(u32, u32)>,
}

impl Variable {
    /// Creates a variable.
    ///
    /// # Errors
    ///
    /// Returns `InvalidParameter` when a dimension has `low > high`, a
    /// `Bool` sits on a word device, the element width is not a whole
    /// number of device units, or the array runs past the last index.
    ///
    /// # Example
    ///
    /// ```
    /// use melsec_slmp::{ElementType, Variable};
    ///
    /// let v = Variable::new("temps", "D200".parse()?, ElementType::Real, vec![(1, 4)])?;
    /// assert_eq!(v.len(), 4);
    /// assert_eq!(v.bit_len(), 128);
    ///
    /// assert!(Variable::scalar("bad", "D0".parse()?, ElementType::Bool).is_err());
    /// # Ok::<(), melsec_slmp::SlmpError>(())
    /// ```
    pub fn new(
        name: impl Into<String>,
        address: DeviceAddress,
        element_type: ElementType,
        dimension: Vec<(u32, u32)>,
    ) -> Result<Self> {
        let name = name.into();
        if let Some(&(low, high)) = dimension.iter().find(|(low, high)| low > high) {
            return Err(SlmpError::invalid_parameter(
                "dimension",
                format!("{name}: bounds {low}..{high} are reversed"),
            ));
        }
        let unit = address.device.unit_bits();
        if element_type == ElementType::Bool && !address.device.is_bit() {
            return Err(SlmpError::invalid_parameter(
                "element_type",
                format!("{name}: BOOL needs a bit device, got {}", address.device),
            ));
        }
        if element_type.bits() % unit != 0 {
            return Err(SlmpError::invalid_parameter(
                "element_type",
                format!("{name}: {element_type} is not a whole number of {} units", address.device),
            ));
        }
        let step = u64::from(element_type.bits() / unit);
        let span = element_count(&dimension).and_then(|n| n.checked_mul(step));
        if !span.is_some_and(|span| span <= u64::from(u32::MAX - address.index)) {
            return Err(SlmpError::invalid_parameter(
                "dimension",
                format!("{name}: array does not fit in {} from {address}", address.device),
            ));
        }
        Ok(Self {
            name,
            address,
            element_type,
            dimension,
        })
    }

    /// Creates a scalar variable.
    pub fn scalar(name: impl Into<String>, address: DeviceAddress, element_type: ElementType) -> Result<Self> {
        Self::new(name, address, element_type, Vec::new())
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        element_count(&self.dimension).map_or(usize::MAX, |n| usize::try_from(n).unwrap_or(usize::MAX))
    }

    /// Always `false`; every variable holds at least one element.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Total width in bits.
    pub fn bit_len(&self) -> u64 {
        self.len() as u64 * u64::from(self.element_type.bits())
    }

    /// Position of the first bit inside the device's bit stream.
    pub fn bit_offset(&self) -> u64 {
        u64::from(self.address.index) * u64::from(self.address.device.unit_bits())
    }

    /// Address of element `i`.
    pub fn element_address(&self, i: usize) -> Result<DeviceAddress> {
        let step = self.element_type.bits() / self.address.device.unit_bits();
        let n = u32::try_from(i)
            .ok()
            .and_then(|i| i.checked_mul(step))
            .ok_or_else(|| SlmpError::invalid_address(format!("{}: element {i} out of range", self.name)))?;
        self.address.offset(n)
    }

    /// Checks a value list against this variable's type and length.
    pub fn check_values(&self, values: &[Value]) -> Result<()> {
        if values.len() != self.len() {
            return Err(SlmpError::invalid_parameter(
                &self.name,
                format!("expected {} values, got {}", self.len(), values.len()),
            ));
        }
        if let Some(v) = values.iter().find(|v| v.element_type() != self.element_type) {
            return Err(SlmpError::invalid_parameter(
                &self.name,
                format!("expected {} values, got {}", self.element_type, v.element_type()),
            ));
        }
        Ok(())
    }

    /// Writes element `i` into `buf` at bit `offset`.
    pub fn encode_element(&self, value: &Value, buf: &mut [u8], offset: usize) {
        set_bits(buf, offset, self.element_type.bits(), value.to_raw());
    }

    /// Reads one element from `buf` at bit `offset`.
    pub fn decode_element(&self, buf: &[u8], offset: usize) -> Value {
        Value::from_raw(self.element_type, get_bits(buf, offset, self.element_type.bits()))
    }

    /// Writes all elements into `buf` starting at bit `offset`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidParameter` on a length or type mismatch.
    pub fn encode(&self, values: &[Value], buf: &mut [u8], offset: usize) -> Result<()> {
        self.check_values(values)?;
        let width = self.element_type.bits() as usize;
        for (i, value) in values.iter().enumerate() {
            self.encode_element(value, buf, offset + i * width);
        }
        Ok(())
    }

    /// Reads all elements from `buf` starting at bit `offset`.
    pub fn decode(&self, buf: &[u8], offset: usize) -> Vec<Value> {
        let width = self.element_type.bits() as usize;
        (0..self.len())
            .map(|i| self.decode_element(buf, offset + i * width))
            .collect()
    }
}

/// Maps symbolic paths to variables.
pub trait VariableResolver {
    /// Resolves `path`, or returns `None` if it is unknown.
    fn resolve(&self, path: &str) -> Option<Variable>;
}

/// Exact-name variable lookup.
#[derive(Debug, Clone, Default)]
pub struct VariableTable {
    variables: HashMap<String, Variable>,
}

impl VariableTable {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a variable.
    pub fn insert(&mut self, variable: Variable) -> Option<Variable> {
        self.variables.insert(variable.name.clone(), variable)
    }

    /// Looks a variable up by name.
    pub fn get(&self, name: &str) -> Option<&Variable> {
        self.variables.get(name)
    }

    /// Number of variables.
    pub fn len(&self) -> usize {
        self.variables.len()
    }

    /// Returns `true` if the table is empty.
    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }
}

impl VariableResolver for VariableTable {
    fn resolve(&self, path: &str) -> Option<Variable> {
        self.get(path).cloned()
    }
}

impl FromIterator<Variable> for VariableTable {
    fn from_iter<I: IntoIterator<Item = Variable>>(iter: I) -> Self {
        let mut table = Self::new();
        for v in iter {
            table.insert(v);
        }
        table
    }
}

/// Transfer direction of a topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Direction {
    /// PLC to caller.
    Read,
    /// Caller to PLC.
    Write,
}

/// A named group of variables transferred together.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Topic {
    /// Topic name.
    pub name: String,
    /// Transfer direction.
    pub direction: Direction,
    /// Publish rate; the optimizer ignores it, callers poll with it.
    pub rate: Option<Duration>,
    /// Variables of the topic.
    pub variables: Vec<Variable>,
}

impl Topic {
    /// Creates a topic from resolved variables.
    pub fn new(name: impl Into<String>, direction: Direction, variables: Vec<Variable>) -> Self {
        Self {
            name: name.into(),
            direction,
            rate: None,
            variables,
        }
    }

    /// Resolves every path through `resolver`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidParameter` naming the first unknown path.
    pub fn resolve(
        name: impl Into<String>,
        direction: Direction,
        paths: &[&str],
        resolver: &impl VariableResolver,
    ) -> Result<Self> {
        let variables = paths
            .iter()
            .map(|path| {
                resolver
                    .resolve(path)
                    .ok_or_else(|| SlmpError::invalid_parameter("variable", format!("unknown variable '{path}'")))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::new(name, direction, variables))
    }

    /// Sets the publish rate.
    pub fn with_rate(mut self, rate: Duration) -> Self {
        self.rate = Some(rate);
        self
    }
}
