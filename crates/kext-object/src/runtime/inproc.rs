//! In-process object runtime
//!
//! A deterministic, thread-safe implementation of [`ObjectRuntime`]: a
//! reference-counted object table guarded by one lock. Tokens are
//! monotonically increasing pointer-aligned addresses, so a released token
//! is never reissued and stale use is always detectable.

use super::{CollectionCallbacks, ObjectRuntime, PathStyle, RuntimeOptions};
use crate::encoding::Encoding;
use crate::error::{ObjectError, ObjectResult};
use crate::kind::{Kind, TypeId};
use crate::number::{NumberType, NumberValue};
use crate::token::RawRef;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;

/// Stored payload of one object slot
#[derive(Debug, Clone)]
enum Stored {
    Text(String),
    Items {
        items: Vec<RawRef>,
        callbacks: CollectionCallbacks,
    },
    Entries {
        entries: Vec<(RawRef, RawRef)>,
        callbacks: CollectionCallbacks,
    },
    Number(NumberValue),
    Boolean(bool),
    Bytes(Vec<u8>),
    Url {
        path: String,
        style: PathStyle,
        directory: bool,
    },
}

#[derive(Debug)]
struct Slot {
    kind: Kind,
    refs: usize,
    /// Pinned slots (the boolean singletons) ignore retain/release and are
    /// never destroyed
    pinned: bool,
    value: Stored,
}

#[derive(Debug, Default)]
struct Table {
    slots: FxHashMap<usize, Slot>,
    next_addr: usize,
    live: usize,
}

impl Table {
    fn slot(&self, raw: RawRef) -> ObjectResult<&Slot> {
        self.slots
            .get(&raw.bits())
            .ok_or(ObjectError::StaleReference)
    }

    fn expect_kind(&self, raw: RawRef, expected: Kind) -> ObjectResult<&Slot> {
        let slot = self.slot(raw)?;
        if slot.kind == expected {
            Ok(slot)
        } else {
            Err(ObjectError::TypeMismatch {
                expected,
                found: slot.kind,
            })
        }
    }

    fn alloc(
        &mut self,
        kind: Kind,
        value: Stored,
        pinned: bool,
        budget: Option<usize>,
    ) -> ObjectResult<RawRef> {
        if !pinned {
            if let Some(max) = budget {
                if self.live >= max {
                    return Err(ObjectError::AllocationFailed);
                }
            }
            self.live += 1;
        }
        // Pointer-aligned addresses, never reissued
        self.next_addr += 8;
        let addr = self.next_addr;
        self.slots.insert(
            addr,
            Slot {
                kind,
                refs: 1,
                pinned,
                value,
            },
        );
        Ok(RawRef::from_bits(addr))
    }

    fn retain(&mut self, raw: RawRef) -> ObjectResult<()> {
        let slot = self
            .slots
            .get_mut(&raw.bits())
            .ok_or(ObjectError::StaleReference)?;
        if !slot.pinned {
            slot.refs += 1;
        }
        Ok(())
    }

    fn release(&mut self, raw: RawRef) -> ObjectResult<()> {
        let slot = match self.slots.get_mut(&raw.bits()) {
            Some(slot) => slot,
            // The address was never issued or the object is already gone;
            // either way this release exceeds the owned reference
            None => return Err(ObjectError::DoubleRelease),
        };
        if slot.pinned {
            return Ok(());
        }
        slot.refs -= 1;
        if slot.refs > 0 {
            return Ok(());
        }

        let slot = self
            .slots
            .remove(&raw.bits())
            .ok_or(ObjectError::DoubleRelease)?;
        self.live -= 1;

        // Retaining containers drop their element references with them
        match slot.value {
            Stored::Items {
                items,
                callbacks: CollectionCallbacks::Retaining,
            } => {
                for item in items {
                    self.release(item)?;
                }
            }
            Stored::Entries {
                entries,
                callbacks: CollectionCallbacks::Retaining,
            } => {
                for (key, value) in entries {
                    self.release(key)?;
                    self.release(value)?;
                }
            }
            _ => {}
        }
        Ok(())
    }

    /// Structural equality for dictionary keys: by value for strings,
    /// numbers, booleans and data; by identity otherwise
    fn keys_equal(&self, a: RawRef, b: RawRef) -> bool {
        if a == b {
            return true;
        }
        match (self.slots.get(&a.bits()), self.slots.get(&b.bits())) {
            (Some(sa), Some(sb)) => match (&sa.value, &sb.value) {
                (Stored::Text(ta), Stored::Text(tb)) => ta == tb,
                (Stored::Number(na), Stored::Number(nb)) => na == nb,
                (Stored::Boolean(ba), Stored::Boolean(bb)) => ba == bb,
                (Stored::Bytes(da), Stored::Bytes(db)) => da == db,
                _ => false,
            },
            _ => false,
        }
    }
}

/// Thread-safe in-process implementation of the foreign runtime contract
#[derive(Debug)]
pub struct InProcRuntime {
    table: RwLock<Table>,
    options: RuntimeOptions,
    true_ref: RawRef,
    false_ref: RawRef,
}

impl InProcRuntime {
    /// Create an unbounded runtime
    pub fn new() -> Self {
        Self::with_options(RuntimeOptions::default())
    }

    /// Create a runtime with an explicit object budget
    pub fn with_options(options: RuntimeOptions) -> Self {
        let mut table = Table::default();
        // Canonical booleans exist for the life of the runtime and never
        // count against the allocation budget
        let false_ref = table
            .alloc(Kind::Boolean, Stored::Boolean(false), true, None)
            .expect("pinned allocation cannot fail");
        let true_ref = table
            .alloc(Kind::Boolean, Stored::Boolean(true), true, None)
            .expect("pinned allocation cannot fail");
        Self {
            table: RwLock::new(table),
            options,
            true_ref,
            false_ref,
        }
    }

    /// Number of live, non-pinned objects (leak-check hook)
    pub fn live_objects(&self) -> usize {
        self.table.read().live
    }

    fn alloc(&self, kind: Kind, value: Stored) -> ObjectResult<RawRef> {
        self.table
            .write()
            .alloc(kind, value, false, self.options.max_objects)
    }
}

impl Default for InProcRuntime {
    fn default() -> Self {
        Self::new()
    }
}

impl ObjectRuntime for InProcRuntime {
    fn retain(&self, raw: RawRef) -> ObjectResult<()> {
        self.table.write().retain(raw)
    }

    fn release(&self, raw: RawRef) -> ObjectResult<()> {
        self.table.write().release(raw)
    }

    fn retain_count(&self, raw: RawRef) -> ObjectResult<usize> {
        Ok(self.table.read().slot(raw)?.refs)
    }

    fn type_id(&self, raw: RawRef) -> ObjectResult<TypeId> {
        Ok(self.table.read().slot(raw)?.kind.type_id())
    }

    fn create_string(&self, bytes: &[u8], encoding: Encoding) -> ObjectResult<RawRef> {
        let text = encoding.decode(bytes)?;
        self.alloc(Kind::String, Stored::Text(text))
    }

    fn string_length(&self, raw: RawRef) -> ObjectResult<usize> {
        let table = self.table.read();
        match &table.expect_kind(raw, Kind::String)?.value {
            Stored::Text(text) => Ok(text.chars().count()),
            _ => Err(ObjectError::StaleReference),
        }
    }

    fn string_bytes(&self, raw: RawRef, encoding: Encoding) -> ObjectResult<Vec<u8>> {
        let table = self.table.read();
        match &table.expect_kind(raw, Kind::String)?.value {
            Stored::Text(text) => encoding.encode(text),
            _ => Err(ObjectError::StaleReference),
        }
    }

    fn create_array(
        &self,
        items: &[RawRef],
        callbacks: CollectionCallbacks,
    ) -> ObjectResult<RawRef> {
        let mut table = self.table.write();
        // Validate every element before touching any reference count so a
        // stale token cannot leave a half-retained array behind
        for item in items {
            table.slot(*item)?;
        }
        if callbacks == CollectionCallbacks::Retaining {
            for item in items {
                table.retain(*item)?;
            }
        }
        let raw = table.alloc(
            Kind::Array,
            Stored::Items {
                items: items.to_vec(),
                callbacks,
            },
            false,
            self.options.max_objects,
        );
        if raw.is_err() && callbacks == CollectionCallbacks::Retaining {
            for item in items {
                let _ = table.release(*item);
            }
        }
        raw
    }

    fn array_count(&self, raw: RawRef) -> ObjectResult<usize> {
        let table = self.table.read();
        match &table.expect_kind(raw, Kind::Array)?.value {
            Stored::Items { items, .. } => Ok(items.len()),
            _ => Err(ObjectError::StaleReference),
        }
    }

    fn array_values(&self, raw: RawRef, start: usize, len: usize) -> ObjectResult<Vec<RawRef>> {
        let table = self.table.read();
        match &table.expect_kind(raw, Kind::Array)?.value {
            Stored::Items { items, .. } => {
                let end = start
                    .checked_add(len)
                    .filter(|end| *end <= items.len())
                    .ok_or(ObjectError::RangeOutOfBounds {
                        start,
                        len,
                        count: items.len(),
                    })?;
                Ok(items[start..end].to_vec())
            }
            _ => Err(ObjectError::StaleReference),
        }
    }

    fn create_dictionary(
        &self,
        entries: &[(RawRef, RawRef)],
        callbacks: CollectionCallbacks,
    ) -> ObjectResult<RawRef> {
        let mut table = self.table.write();
        for (key, value) in entries {
            table.slot(*key)?;
            table.slot(*value)?;
        }

        // Duplicate keys collapse last-wins so stored keys are unique
        let mut deduped: Vec<(RawRef, RawRef)> = Vec::with_capacity(entries.len());
        for &(key, value) in entries {
            match deduped.iter_mut().find(|(k, _)| table.keys_equal(*k, key)) {
                Some(entry) => *entry = (key, value),
                None => deduped.push((key, value)),
            }
        }

        if callbacks == CollectionCallbacks::Retaining {
            for (key, value) in &deduped {
                table.retain(*key)?;
                table.retain(*value)?;
            }
        }
        let raw = table.alloc(
            Kind::Dictionary,
            Stored::Entries {
                entries: deduped.clone(),
                callbacks,
            },
            false,
            self.options.max_objects,
        );
        if raw.is_err() && callbacks == CollectionCallbacks::Retaining {
            for (key, value) in &deduped {
                let _ = table.release(*key);
                let _ = table.release(*value);
            }
        }
        raw
    }

    fn dictionary_count(&self, raw: RawRef) -> ObjectResult<usize> {
        let table = self.table.read();
        match &table.expect_kind(raw, Kind::Dictionary)?.value {
            Stored::Entries { entries, .. } => Ok(entries.len()),
            _ => Err(ObjectError::StaleReference),
        }
    }

    fn dictionary_entries(&self, raw: RawRef) -> ObjectResult<Vec<(RawRef, RawRef)>> {
        let table = self.table.read();
        match &table.expect_kind(raw, Kind::Dictionary)?.value {
            Stored::Entries { entries, .. } => Ok(entries.clone()),
            _ => Err(ObjectError::StaleReference),
        }
    }

    fn create_number(&self, value: NumberValue) -> ObjectResult<RawRef> {
        self.alloc(Kind::Number, Stored::Number(value))
    }

    fn number_type(&self, raw: RawRef) -> ObjectResult<NumberType> {
        self.number_value(raw).map(NumberValue::number_type)
    }

    fn number_value(&self, raw: RawRef) -> ObjectResult<NumberValue> {
        let table = self.table.read();
        match &table.expect_kind(raw, Kind::Number)?.value {
            Stored::Number(value) => Ok(*value),
            _ => Err(ObjectError::StaleReference),
        }
    }

    fn boolean(&self, value: bool) -> RawRef {
        if value {
            self.true_ref
        } else {
            self.false_ref
        }
    }

    fn boolean_value(&self, raw: RawRef) -> ObjectResult<bool> {
        let table = self.table.read();
        match &table.expect_kind(raw, Kind::Boolean)?.value {
            Stored::Boolean(value) => Ok(*value),
            _ => Err(ObjectError::StaleReference),
        }
    }

    fn create_data(&self, bytes: &[u8]) -> ObjectResult<RawRef> {
        self.alloc(Kind::Data, Stored::Bytes(bytes.to_vec()))
    }

    fn data_length(&self, raw: RawRef) -> ObjectResult<usize> {
        let table = self.table.read();
        match &table.expect_kind(raw, Kind::Data)?.value {
            Stored::Bytes(bytes) => Ok(bytes.len()),
            _ => Err(ObjectError::StaleReference),
        }
    }

    fn data_bytes(&self, raw: RawRef) -> ObjectResult<Vec<u8>> {
        let table = self.table.read();
        match &table.expect_kind(raw, Kind::Data)?.value {
            Stored::Bytes(bytes) => Ok(bytes.clone()),
            _ => Err(ObjectError::StaleReference),
        }
    }

    fn create_url(
        &self,
        path: RawRef,
        style: PathStyle,
        is_directory: bool,
    ) -> ObjectResult<RawRef> {
        let text = {
            let table = self.table.read();
            match &table.expect_kind(path, Kind::String)?.value {
                Stored::Text(text) => text.clone(),
                _ => return Err(ObjectError::StaleReference),
            }
        };
        self.alloc(
            Kind::Url,
            Stored::Url {
                path: text,
                style,
                directory: is_directory,
            },
        )
    }

    fn url_path(&self, raw: RawRef) -> ObjectResult<String> {
        let table = self.table.read();
        match &table.expect_kind(raw, Kind::Url)?.value {
            Stored::Url { path, .. } => Ok(path.clone()),
            _ => Err(ObjectError::StaleReference),
        }
    }

    fn url_path_style(&self, raw: RawRef) -> ObjectResult<PathStyle> {
        let table = self.table.read();
        match &table.expect_kind(raw, Kind::Url)?.value {
            Stored::Url { style, .. } => Ok(*style),
            _ => Err(ObjectError::StaleReference),
        }
    }

    fn url_is_directory(&self, raw: RawRef) -> ObjectResult<bool> {
        let table = self.table.read();
        match &table.expect_kind(raw, Kind::Url)?.value {
            Stored::Url { directory, .. } => Ok(*directory),
            _ => Err(ObjectError::StaleReference),
        }
    }
}
