//! Safe handles over a reference-counted foreign object runtime
//!
//! This crate provides the memory-safe, type-checked boundary layer:
//! - Kind tags and fixed runtime type identifiers
//! - Opaque reference tokens (the boundary representation)
//! - Owned handles with exactly-once release and checked down-casts
//! - Borrowed views for `get`-family access
//! - Deep conversion between object graphs and plain value trees
//! - The foreign runtime contract and a deterministic in-process
//!   implementation of it

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod convert;
pub mod encoding;
pub mod error;
pub mod handle;
pub mod kind;
pub mod number;
pub mod runtime;
pub mod token;

pub use convert::{convert, dictionary_from_properties, to_handle, PropertyValue};
pub use encoding::Encoding;
pub use error::{ObjectError, ObjectResult};
pub use handle::{
    ArrayHandle, BooleanHandle, BorrowedObject, DataHandle, DictionaryHandle, NumberHandle,
    ObjectHandle, StringHandle, UrlHandle,
};
pub use kind::{Kind, TypeId};
pub use number::{NumberType, NumberValue};
pub use runtime::{CollectionCallbacks, InProcRuntime, ObjectRuntime, PathStyle, RuntimeOptions};
pub use token::RawRef;
