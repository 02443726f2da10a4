//! `DataBuffer`: the fixed-capacity, columnar, semaphore-guarded MPSC ring
//! shared between pipeline workers and the consumer.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::dtype::{Dtype, Shape};
use crate::featurizer::Builder;
use crate::error::{Error, Result};
use crate::semaphore::Semaphore;

struct Column {
    shape: Shape,
    dtype: Dtype,
    bytes: Vec<u8>,
}

impl Column {
    fn new(shape: Shape, dtype: Dtype, cap: usize) -> Self {
        let item_len = shape.numel() * dtype.size_of();
        Column {
            shape,
            dtype,
            bytes: vec![0u8; cap * item_len],
        }
    }

    fn item_len(&self) -> usize {
        self.shape.numel() * self.dtype.size_of()
    }
}

struct Inner {
    columns: HashMap<&'static str, Column>,
    write_cursor: usize,
    read_cursor: usize,
}

/// Columnar ring of fixed capacity `cap`. Columns are registered lazily on
/// first write; `(shape, dtype)` are then fixed for that name for the
/// buffer's lifetime.
pub struct DataBuffer {
    cap: usize,
    empty: Semaphore,
    full: Semaphore,
    inner: Mutex<Inner>,
}

impl DataBuffer {
    pub fn new(cap: usize) -> Self {
        assert!(cap > 0, "DataBuffer capacity must be positive");
        DataBuffer {
            cap,
            empty: Semaphore::new(cap),
            full: Semaphore::new(0),
            inner: Mutex::new(Inner {
                columns: HashMap::new(),
                write_cursor: 0,
                read_cursor: 0,
            }),
        }
    }

    pub fn capacity(&self) -> usize {
        self.cap
    }

    /// Permits currently available to a producer (diagnostic/test use).
    pub fn empty_permits(&self) -> usize {
        self.empty.value()
    }

    /// Items currently ready for a consumer (diagnostic/test use).
    pub fn full_permits(&self) -> usize {
        self.full.value()
    }

    /// A producer acquires this freely (no lock) and writes named values
    /// into it before calling [`WriteTransaction::commit`].
    pub fn begin_write(&self) -> WriteTransaction<'_> {
        WriteTransaction {
            buffer: self,
            scratch: HashMap::new(),
        }
    }

    /// Blocks until `n` contiguous items are ready, then invokes `callback`
    /// with the per-column byte spans while holding the buffer's mutex.
    /// `1 <= n <= cap`.
    pub fn begin_read<R>(&self, n: usize, callback: impl FnOnce(&[ColumnRead<'_>]) -> R) -> R {
        assert!(n >= 1 && n <= self.cap, "read batch size out of [1, cap]");
        self.full.acquire_n(n);

        let mut inner = self.inner.lock().unwrap();
        let read_cursor = inner.read_cursor;
        let cap = self.cap;

        let reads: Vec<ColumnRead<'_>> = inner
            .columns
            .iter()
            .map(|(name, column)| {
                let item_len = column.item_len();
                let (first, second) = if read_cursor + n <= cap {
                    (
                        &column.bytes[read_cursor * item_len..(read_cursor + n) * item_len],
                        None,
                    )
                } else {
                    let first_len = cap - read_cursor;
                    let second_len = n - first_len;
                    (
                        &column.bytes[read_cursor * item_len..cap * item_len],
                        Some(&column.bytes[0..second_len * item_len]),
                    )
                };
                ColumnRead {
                    name,
                    shape: &column.shape,
                    dtype: column.dtype,
                    first,
                    second,
                }
            })
            .collect();

        let result = callback(&reads);
        drop(reads);

        inner.read_cursor = (read_cursor + n) % cap;
        drop(inner);
        self.empty.release_n(n);
        result
    }

    /// Drains outstanding `full` permits back to `empty`, resets both
    /// cursors, and drops column registrations — done under the mutex.
    pub fn clear(&self) {
        let mut inner = self.inner.lock().unwrap();
        let drained = self.full.drain();
        self.empty.release_n(drained);
        inner.write_cursor = 0;
        inner.read_cursor = 0;
        inner.columns.clear();
    }
}

/// A single column's readable byte span(s), handed to the consumer callback
/// of [`DataBuffer::begin_read`]. Wraps around the ring as `first`/`second`
/// when the requested batch straddles the end of the buffer.
pub struct ColumnRead<'a> {
    pub name: &'static str,
    pub shape: &'a Shape,
    pub dtype: Dtype,
    pub first: &'a [u8],
    pub second: Option<&'a [u8]>,
}

struct ScratchValue {
    shape: Shape,
    dtype: Dtype,
    bytes: Vec<u8>,
}

/// Collects named values from a single featurizer pass, then commits them
/// atomically into the ring.
pub struct WriteTransaction<'a> {
    buffer: &'a DataBuffer,
    scratch: HashMap<&'static str, ScratchValue>,
}

impl<'a> WriteTransaction<'a> {
    fn check_fresh(&self, name: &'static str) -> Result<()> {
        if self.scratch.contains_key(name) {
            return Err(Error::PushReaction(format!(
                "featurizer wrote column {name:?} twice in one transaction"
            )));
        }
        Ok(())
    }

    /// Acquires one `empty` permit (blocking if the ring is full), locks the
    /// buffer, registers any new columns / asserts shape+dtype stability for
    /// existing ones, copies every scratch value into `write_cursor`,
    /// advances the cursor, and releases one `full` permit.
    ///
    /// A transaction that is simply dropped without calling `commit`
    /// releases no permits.
    pub fn commit(self) -> Result<()> {
        self.buffer.empty.acquire();

        let mut inner = self.buffer.inner.lock().unwrap();
        let cursor = inner.write_cursor;
        let cap = self.buffer.cap;

        for (name, value) in self.scratch.into_iter() {
            let column = inner
                .columns
                .entry(name)
                .or_insert_with(|| Column::new(value.shape.clone(), value.dtype, cap));
            assert_eq!(
                column.shape, value.shape,
                "column {name:?} shape changed between writes"
            );
            assert_eq!(
                column.dtype, value.dtype,
                "column {name:?} dtype changed between writes"
            );
            let item_len = column.item_len();
            let start = cursor * item_len;
            column.bytes[start..start + item_len].copy_from_slice(&value.bytes);
        }

        inner.write_cursor = (cursor + 1) % cap;
        drop(inner);
        self.buffer.full.release();
        Ok(())
    }
}

impl<'a> Builder for WriteTransaction<'a> {
    fn write_i64(&mut self, name: &'static str, shape: Shape, values: &[i64]) -> Result<()> {
        self.check_fresh(name)?;
        debug_assert_eq!(values.len(), shape.numel());
        let bytes = values.iter().flat_map(|v| v.to_le_bytes()).collect();
        self.scratch.insert(
            name,
            ScratchValue {
                shape,
                dtype: Dtype::I64,
                bytes,
            },
        );
        Ok(())
    }

    fn write_f32(&mut self, name: &'static str, shape: Shape, values: &[f32]) -> Result<()> {
        self.check_fresh(name)?;
        debug_assert_eq!(values.len(), shape.numel());
        let bytes = values.iter().flat_map(|v| v.to_le_bytes()).collect();
        self.scratch.insert(
            name,
            ScratchValue {
                shape,
                dtype: Dtype::F32,
                bytes,
            },
        );
        Ok(())
    }

    fn write_bool(&mut self, name: &'static str, shape: Shape, values: &[bool]) -> Result<()> {
        self.check_fresh(name)?;
        debug_assert_eq!(values.len(), shape.numel());
        let bytes = values.iter().map(|v| *v as u8).collect();
        self.scratch.insert(
            name,
            ScratchValue {
                shape,
                dtype: Dtype::Bool,
                bytes,
            },
        );
        Ok(())
    }
}
