//! ABI codec: method call encoding and positional result decoding.
//!
//! Arguments are [`DynSolValue`]s, the closed set of ABI value kinds. Each
//! argument is checked against the declared parameter type before encoding.
//! Decoded outputs are wrapped in a [`CallResult`] whose getters project a
//! value into the requested Rust type.

use alloy_dyn_abi::{
    DynSolType,
    DynSolValue,
    FunctionExt,
    JsonAbiExt,
};
use alloy_json_abi::{
    Function,
    JsonAbi,
};
use alloy_primitives::{
    Address,
    B256,
    Bytes,
    I256,
    Sign,
    U256,
};
use alloy_sol_types::SolType;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EncodingError {
    #[error("method `{0}` not found in ABI")]
    UnknownMethod(String),
    #[error("method `{method}` expects {expected} arguments, got {actual}")]
    ArityMismatch {
        method: String,
        expected: usize,
        actual: usize,
    },
    #[error("argument {index} of `{method}` does not match declared type `{expected}`")]
    TypeMismatch {
        method: String,
        index: usize,
        expected: String,
    },
    #[error("error parsing ABI type: {0}")]
    ParseType(#[from] alloy_dyn_abi::parser::Error),
    #[error("argument {index} of `{method}` does not fit in `{expected}`")]
    OutOfRange {
        method: String,
        index: usize,
        expected: String,
    },
    #[error("dynamic ABI error: {0}")]
    DynAbi(#[from] alloy_dyn_abi::Error),
}

#[derive(Debug, Error)]
pub enum DecodingError {
    #[error("method `{0}` not found in ABI")]
    UnknownMethod(String),
    #[error("method `{0}` is overloaded with differing outputs")]
    AmbiguousMethod(String),
    #[error("empty return data for `{0}`")]
    EmptyReturnData(String),
    #[error("failed to decode return data for `{method}`: {source}")]
    Malformed {
        method: String,
        #[source]
        source: alloy_dyn_abi::Error,
    },
}

/// Encodes `method(args)` as call data: the 4-byte selector followed by the
/// encoded arguments.
pub fn encode(abi: &JsonAbi, method: &str, args: &[DynSolValue]) -> Result<Bytes, EncodingError> {
    let function = select_function(abi, method, args)?;
    Ok(function.abi_encode_input(args)?.into())
}

/// Decodes the return data of `method` into a [`CallResult`].
///
/// Overloads are accepted only when they all declare the same outputs.
pub fn decode(abi: &JsonAbi, method: &str, data: &[u8]) -> Result<CallResult, DecodingError> {
    let overloads = abi
        .function(method)
        .filter(|overloads| !overloads.is_empty())
        .ok_or_else(|| DecodingError::UnknownMethod(method.to_string()))?;
    let function = &overloads[0];
    if overloads[1..].iter().any(|f| f.outputs != function.outputs) {
        return Err(DecodingError::AmbiguousMethod(method.to_string()));
    }
    decode_output(function, data)
}

/// Decodes return data against one resolved function.
pub fn decode_output(function: &Function, data: &[u8]) -> Result<CallResult, DecodingError> {
    if data.is_empty() && !function.outputs.is_empty() {
        return Err(DecodingError::EmptyReturnData(function.name.clone()));
    }
    let outputs = function
        .abi_decode_output(data)
        .map_err(|source| DecodingError::Malformed {
            method: function.name.clone(),
            source,
        })?;
    Ok(CallResult::new(outputs))
}

/// Picks the overload of `method` whose inputs accept `args`.
pub fn select_function<'a>(
    abi: &'a JsonAbi,
    method: &str,
    args: &[DynSolValue],
) -> Result<&'a Function, EncodingError> {
    let overloads = abi
        .function(method)
        .filter(|overloads| !overloads.is_empty())
        .ok_or_else(|| EncodingError::UnknownMethod(method.to_string()))?;

    let mut first_error = None;
    for function in overloads {
        match typecheck(function, args) {
            Ok(()) => return Ok(function),
            Err(err) => {
                first_error.get_or_insert(err);
            }
        }
    }
    Err(first_error.unwrap_or_else(|| EncodingError::UnknownMethod(method.to_string())))
}

fn typecheck(function: &Function, args: &[DynSolValue]) -> Result<(), EncodingError> {
    if function.inputs.len() != args.len() {
        return Err(EncodingError::ArityMismatch {
            method: function.name.clone(),
            expected: function.inputs.len(),
            actual: args.len(),
        });
    }
    for (index, (input, arg)) in function.inputs.iter().zip(args).enumerate() {
        let ty = DynSolType::parse(&input.selector_type())?;
        if !ty.matches(arg) {
            return Err(EncodingError::TypeMismatch {
                method: function.name.clone(),
                index,
                expected: ty.sol_type_name().into_owned(),
            });
        }
        if !fits(&ty, arg) {
            return Err(EncodingError::OutOfRange {
                method: function.name.clone(),
                index,
                expected: ty.sol_type_name().into_owned(),
            });
        }
    }
    Ok(())
}

// `matches` compares kinds and declared widths only, not magnitudes.
fn fits(ty: &DynSolType, value: &DynSolValue) -> bool {
    match (ty, value) {
        (DynSolType::Uint(bits), DynSolValue::Uint(value, _)) => value.bit_len() <= *bits,
        (DynSolType::Int(bits), DynSolValue::Int(value, _)) => {
            if *bits >= 256 {
                return true;
            }
            let bound = U256::from(1) << (*bits - 1);
            match value.into_sign_and_abs() {
                (Sign::Negative, abs) => abs <= bound,
                (Sign::Positive, abs) => abs < bound,
            }
        }
        (DynSolType::Array(inner), DynSolValue::Array(items))
        | (DynSolType::FixedArray(inner, _), DynSolValue::FixedArray(items)) => {
            items.iter().all(|item| fits(inner, item))
        }
        (DynSolType::Tuple(types), DynSolValue::Tuple(items)) => {
            types.iter().zip(items).all(|(ty, item)| fits(ty, item))
        }
        _ => true,
    }
}

/// Coerces human-entered strings into arguments for `function`, e.g. `"42"`
/// for `uint256` or `"[1, 2]"` for `uint8[]`.
pub fn coerce_args<I, S>(function: &Function, args: I) -> Result<Vec<DynSolValue>, EncodingError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let args: Vec<S> = args.into_iter().collect();
    if args.len() != function.inputs.len() {
        return Err(EncodingError::ArityMismatch {
            method: function.name.clone(),
            expected: function.inputs.len(),
            actual: args.len(),
        });
    }
    function
        .inputs
        .iter()
        .zip(&args)
        .map(|(input, arg)| coerce_value(&input.selector_type(), arg.as_ref()))
        .collect()
}

/// Coerces a single string into a [`DynSolValue`] of type `ty`.
pub fn coerce_value(ty: &str, arg: &str) -> Result<DynSolValue, EncodingError> {
    let ty = DynSolType::parse(ty)?;
    Ok(ty.coerce_str(arg)?)
}

/// Checked projection from a decoded ABI value into a Rust type.
pub trait FromDynValue: Sized {
    /// Name used in projection failure messages.
    const EXPECTED: &'static str;

    fn from_dyn(value: &DynSolValue) -> Option<Self>;
}

macro_rules! impl_from_dyn_uint {
    ($($ty:ty),+) => {
        $(
            impl FromDynValue for $ty {
                const EXPECTED: &'static str = stringify!($ty);

                fn from_dyn(value: &DynSolValue) -> Option<Self> {
                    let (value, _) = value.as_uint()?;
                    <$ty>::try_from(value).ok()
                }
            }
        )+
    };
}

impl_from_dyn_uint!(u8, u16, u32, u64, u128);

impl FromDynValue for U256 {
    const EXPECTED: &'static str = "uint";

    fn from_dyn(value: &DynSolValue) -> Option<Self> {
        value.as_uint().map(|(value, _)| value)
    }
}

impl FromDynValue for I256 {
    const EXPECTED: &'static str = "int";

    fn from_dyn(value: &DynSolValue) -> Option<Self> {
        value.as_int().map(|(value, _)| value)
    }
}

impl FromDynValue for bool {
    const EXPECTED: &'static str = "bool";

    fn from_dyn(value: &DynSolValue) -> Option<Self> {
        value.as_bool()
    }
}

impl FromDynValue for Address {
    const EXPECTED: &'static str = "address";

    fn from_dyn(value: &DynSolValue) -> Option<Self> {
        value.as_address()
    }
}

impl FromDynValue for B256 {
    const EXPECTED: &'static str = "bytes32";

    fn from_dyn(value: &DynSolValue) -> Option<Self> {
        match value.as_fixed_bytes()? {
            (bytes, 32) => Some(B256::from_slice(bytes)),
            _ => None,
        }
    }
}

impl FromDynValue for [u8; 32] {
    const EXPECTED: &'static str = "bytes32";

    fn from_dyn(value: &DynSolValue) -> Option<Self> {
        B256::from_dyn(value).map(|word| word.0)
    }
}

impl FromDynValue for Bytes {
    const EXPECTED: &'static str = "bytes";

    fn from_dyn(value: &DynSolValue) -> Option<Self> {
        value.as_bytes().map(|bytes| Bytes::copy_from_slice(bytes))
    }
}

impl FromDynValue for String {
    const EXPECTED: &'static str = "string";

    fn from_dyn(value: &DynSolValue) -> Option<Self> {
        value.as_str().map(str::to_string)
    }
}

impl<T: FromDynValue> FromDynValue for Vec<T> {
    const EXPECTED: &'static str = "array";

    fn from_dyn(value: &DynSolValue) -> Option<Self> {
        let items = match value {
            DynSolValue::Array(items) | DynSolValue::FixedArray(items) => items,
            _ => return None,
        };
        items.iter().map(T::from_dyn).collect()
    }
}

/// Ordered outputs of one decode operation.
///
/// The output shape is fixed by the ABI at the call site, so an out-of-range
/// index or a value of the wrong kind is a caller bug and the getters panic.
#[derive(Debug, Clone, PartialEq)]
pub struct CallResult {
    outputs: Vec<DynSolValue>,
}

impl CallResult {
    pub fn new(outputs: Vec<DynSolValue>) -> Self {
        Self { outputs }
    }

    pub fn len(&self) -> usize {
        self.outputs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outputs.is_empty()
    }

    pub fn values(&self) -> &[DynSolValue] {
        &self.outputs
    }

    pub fn into_values(self) -> Vec<DynSolValue> {
        self.outputs
    }

    /// Projects output `i` into `T`, returning `None` when the index is out of
    /// range or the value is not representable as `T`.
    pub fn try_get<T: FromDynValue>(&self, i: usize) -> Option<T> {
        self.outputs.get(i).and_then(T::from_dyn)
    }

    /// Projects output `i` into `T`.
    ///
    /// # Panics
    ///
    /// Panics if `i` is out of range or output `i` is not representable as `T`.
    #[track_caller]
    pub fn get<T: FromDynValue>(&self, i: usize) -> T {
        let value = self.value(i);
        T::from_dyn(value).unwrap_or_else(|| {
            panic!(
                "call result output {i} is not representable as {}: {value:?}",
                T::EXPECTED
            )
        })
    }

    #[track_caller]
    pub fn get_uint8(&self, i: usize) -> u8 {
        self.get(i)
    }

    #[track_caller]
    pub fn get_uint32(&self, i: usize) -> u32 {
        self.get(i)
    }

    #[track_caller]
    pub fn get_uint64(&self, i: usize) -> u64 {
        self.get(i)
    }

    #[track_caller]
    pub fn get_bool(&self, i: usize) -> bool {
        self.get(i)
    }

    #[track_caller]
    pub fn get_hash(&self, i: usize) -> B256 {
        self.get(i)
    }

    #[track_caller]
    pub fn get_address(&self, i: usize) -> Address {
        self.get(i)
    }

    #[track_caller]
    pub fn get_big_int(&self, i: usize) -> U256 {
        self.get(i)
    }

    #[track_caller]
    pub fn get_bytes(&self, i: usize) -> Bytes {
        self.get(i)
    }

    #[track_caller]
    pub fn get_bytes32(&self, i: usize) -> [u8; 32] {
        self.get(i)
    }

    #[track_caller]
    pub fn get_bytes32_vec(&self, i: usize) -> Vec<[u8; 32]> {
        self.get(i)
    }

    /// Converts output `i` into the Rust type of a `sol!` struct (or any other
    /// [`SolType`] with the same ABI shape).
    ///
    /// # Panics
    ///
    /// Panics if `i` is out of range or the shapes differ.
    #[track_caller]
    pub fn get_struct<T: SolType>(&self, i: usize) -> T::RustType {
        let value = self.value(i);
        T::abi_decode(&value.abi_encode()).unwrap_or_else(|err| {
            panic!("call result output {i} does not match the requested struct: {err}")
        })
    }

    #[track_caller]
    fn value(&self, i: usize) -> &DynSolValue {
        self.outputs.get(i).unwrap_or_else(|| {
            panic!(
                "call result has {} outputs, index {i} is out of range",
                self.outputs.len()
            )
        })
    }
}
