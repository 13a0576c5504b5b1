// blob.rs - Aligned raw byte storage for type-erased components
//
// Every raw allocation, pointer offset and pointer-to-reference cast in the
// ECS lives in this file. `Column` and `BlobSegment` expose checked APIs so
// the rest of the crate never reinterprets bytes on its own.

use crate::ecs::ComponentDescriptor;
use std::alloc::{self, Layout};
use std::any::{type_name, TypeId};
use std::ptr::{self, NonNull};

/// Aligned, growable byte buffer with no notion of elements.
///
/// Growth always allocates a fresh block, relocates the live prefix and frees
/// the old block, so the buffer never holds two live copies of a value.
pub(crate) struct BlobBuffer {
    ptr: NonNull<u8>,
    capacity: usize,
    align: usize,
}

// Only component data (Send + Sync) is ever stored in a blob.
unsafe impl Send for BlobBuffer {}
unsafe impl Sync for BlobBuffer {}

impl BlobBuffer {
    pub fn new(align: usize) -> Self {
        debug_assert!(align.is_power_of_two());
        Self {
            ptr: dangling(align),
            capacity: 0,
            align,
        }
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[inline]
    pub fn align(&self) -> usize {
        self.align
    }

    /// Reallocate to `new_capacity` bytes, keeping the first `keep` bytes.
    ///
    /// The alignment never shrinks. When `zero_tail` is set every byte past
    /// `keep` reads as zero afterwards.
    pub fn grow(&mut self, new_capacity: usize, align: usize, keep: usize, zero_tail: bool) {
        let align = align.max(self.align);
        debug_assert!(keep <= self.capacity && keep <= new_capacity);

        if new_capacity == 0 {
            if self.capacity == 0 {
                self.ptr = dangling(align);
                self.align = align;
            }
            return;
        }

        let layout = Layout::from_size_align(new_capacity, align).unwrap_or_else(|_| {
            panic!("blob layout overflow: {new_capacity} bytes at align {align}")
        });
        // SAFETY: layout has a non-zero size.
        let raw = unsafe {
            if zero_tail {
                alloc::alloc_zeroed(layout)
            } else {
                alloc::alloc(layout)
            }
        };
        let fresh = NonNull::new(raw).unwrap_or_else(|| alloc::handle_alloc_error(layout));
        if keep > 0 {
            // SAFETY: both blocks hold at least `keep` bytes and are distinct allocations.
            unsafe { ptr::copy_nonoverlapping(self.ptr.as_ptr(), fresh.as_ptr(), keep) };
        }
        self.release();
        self.ptr = fresh;
        self.capacity = new_capacity;
        self.align = align;
    }

    #[inline]
    fn at(&self, offset: usize) -> *mut u8 {
        debug_assert!(offset <= self.capacity || self.capacity == 0);
        self.ptr.as_ptr().wrapping_add(offset)
    }

    fn release(&mut self) {
        if self.capacity > 0 {
            let layout = Layout::from_size_align(self.capacity, self.align)
                .unwrap_or_else(|_| unreachable!("layout was valid at allocation"));
            // SAFETY: ptr was allocated with exactly this layout in `grow`.
            unsafe { alloc::dealloc(self.ptr.as_ptr(), layout) };
            self.capacity = 0;
        }
    }
}

impl Drop for BlobBuffer {
    fn drop(&mut self) {
        self.release();
    }
}

fn dangling(align: usize) -> NonNull<u8> {
    NonNull::new(ptr::null_mut::<u8>().wrapping_add(align)).unwrap_or(NonNull::dangling())
}

fn assert_type<T: 'static>(descriptor: &ComponentDescriptor) {
    assert!(
        descriptor.type_id() == TypeId::of::<T>(),
        "component {} ({}) accessed as {}",
        descriptor.id(),
        descriptor.name(),
        type_name::<T>()
    );
    assert_eq!(descriptor.size(), std::mem::size_of::<T>());
}

/// A single component column: `len` initialized elements of one type.
///
/// Columns of types without drop glue are the "trivial" partition; they are
/// zero-filled on growth and need no cleanup. Columns with a destroy hook
/// run it exactly once per element that leaves the column.
pub struct Column {
    descriptor: &'static ComponentDescriptor,
    buffer: BlobBuffer,
    len: usize,
    capacity: usize,
}

impl Column {
    pub(crate) fn new(descriptor: &'static ComponentDescriptor) -> Self {
        Self {
            descriptor,
            buffer: BlobBuffer::new(descriptor.align()),
            len: 0,
            capacity: 0,
        }
    }

    #[inline]
    pub fn descriptor(&self) -> &'static ComponentDescriptor {
        self.descriptor
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[inline]
    pub fn is_destructible(&self) -> bool {
        self.descriptor.is_destructible()
    }

    #[inline]
    fn row_ptr(&self, row: usize) -> *mut u8 {
        self.buffer.at(row * self.descriptor.size())
    }

    /// Grow to hold `new_capacity` rows, relocating the live rows.
    pub(crate) fn grow(&mut self, new_capacity: usize) {
        assert!(new_capacity >= self.len, "column cannot shrink below its length");
        if new_capacity <= self.capacity {
            return;
        }
        let size = self.descriptor.size();
        let bytes = new_capacity
            .checked_mul(size)
            .unwrap_or_else(|| panic!("column for {} overflows usize", self.descriptor.name()));
        self.buffer.grow(
            bytes,
            self.descriptor.align(),
            self.len * size,
            !self.is_destructible(),
        );
        self.capacity = new_capacity;
    }

    /// Append a default-constructed element.
    pub(crate) fn push_default(&mut self) {
        assert!(self.len < self.capacity, "column at capacity");
        // SAFETY: row `len` is in bounds and uninitialized.
        unsafe { (self.descriptor.construct_fn())(self.row_ptr(self.len), 1) };
        self.len += 1;
    }

    /// Append an element by taking ownership of the bytes at `src`, a value
    /// staged for `staged`.
    ///
    /// # Panics
    /// If `staged` describes a different type than this column stores.
    ///
    /// # Safety
    /// `src` must point to a live, properly aligned value of `staged`'s type,
    /// and the caller must treat that value as moved out.
    pub(crate) unsafe fn push_moved(&mut self, staged: &ComponentDescriptor, src: *const u8) {
        assert!(
            staged.type_id() == self.descriptor.type_id(),
            "value staged as {} ({}) cannot move into the column of {} ({})",
            staged.id(),
            staged.name(),
            self.descriptor.id(),
            self.descriptor.name()
        );
        assert!(self.len < self.capacity, "column at capacity");
        let size = self.descriptor.size();
        if size > 0 {
            ptr::copy_nonoverlapping(src, self.row_ptr(self.len), size);
        }
        self.len += 1;
    }

    /// Destroy `row` and fill the hole with the last element.
    pub(crate) fn swap_remove(&mut self, row: usize) {
        assert!(row < self.len, "row {row} out of bounds (len {})", self.len);
        let last = self.len - 1;
        // SAFETY: `row` is initialized; after dropping it the slot is
        // uninitialized and receives a bitwise move of `last`, which is then
        // forgotten by shrinking `len`.
        unsafe {
            if let Some(destroy) = self.descriptor.destroy_fn() {
                destroy(self.row_ptr(row), 1);
            }
            if row != last && self.descriptor.size() > 0 {
                ptr::copy_nonoverlapping(
                    self.row_ptr(last),
                    self.row_ptr(row),
                    self.descriptor.size(),
                );
            }
        }
        self.len = last;
    }

    /// Destroy the last element.
    pub(crate) fn pop(&mut self) {
        assert!(self.len > 0, "pop on empty column");
        self.len -= 1;
        if let Some(destroy) = self.descriptor.destroy_fn() {
            // SAFETY: the former last row is initialized and no longer counted.
            unsafe { destroy(self.row_ptr(self.len), 1) };
        }
    }

    /// Destroy every element while keeping the allocation.
    pub(crate) fn clear(&mut self) {
        let len = std::mem::take(&mut self.len);
        if let Some(destroy) = self.descriptor.destroy_fn() {
            if len > 0 {
                // SAFETY: rows 0..len were initialized and are no longer counted.
                unsafe { destroy(self.row_ptr(0), len) };
            }
        }
    }

    pub fn get<T: 'static>(&self, row: usize) -> Option<&T> {
        assert_type::<T>(self.descriptor);
        if row >= self.len {
            return None;
        }
        // SAFETY: type checked above and row is initialized.
        Some(unsafe { &*(self.row_ptr(row) as *const T) })
    }

    pub fn get_mut<T: 'static>(&mut self, row: usize) -> Option<&mut T> {
        assert_type::<T>(self.descriptor);
        if row >= self.len {
            return None;
        }
        // SAFETY: type checked above, row is initialized, and `&mut self` is unique.
        Some(unsafe { &mut *(self.row_ptr(row) as *mut T) })
    }

    pub fn as_slice<T: 'static>(&self) -> &[T] {
        assert_type::<T>(self.descriptor);
        // SAFETY: the first `len` elements are initialized values of T.
        unsafe { std::slice::from_raw_parts(self.row_ptr(0) as *const T, self.len) }
    }

    pub fn as_mut_slice<T: 'static>(&mut self) -> &mut [T] {
        assert_type::<T>(self.descriptor);
        // SAFETY: as above, with unique access through `&mut self`.
        unsafe { std::slice::from_raw_parts_mut(self.row_ptr(0) as *mut T, self.len) }
    }
}

impl Drop for Column {
    fn drop(&mut self) {
        self.clear();
    }
}

/// Mutable slices of two distinct columns at once.
pub(crate) fn column_pair_mut<'a, A: 'static, B: 'static>(
    columns: &'a mut [Column],
    a: usize,
    b: usize,
) -> (&'a mut [A], &'a mut [B]) {
    assert_ne!(a, b, "column pair must name two different columns");
    if a < b {
        let (head, tail) = columns.split_at_mut(b);
        (head[a].as_mut_slice::<A>(), tail[0].as_mut_slice::<B>())
    } else {
        let (head, tail) = columns.split_at_mut(a);
        (tail[0].as_mut_slice::<A>(), head[b].as_mut_slice::<B>())
    }
}

/// Bump-style byte segment holding heterogeneous staged values.
///
/// Values are appended at aligned offsets and later either moved out into a
/// column or destroyed in place. The segment itself never drops anything;
/// its owner tracks which offsets are live.
pub(crate) struct BlobSegment {
    buffer: BlobBuffer,
    len: usize,
    initial_bytes: usize,
    zeroed: bool,
}

impl BlobSegment {
    pub fn new(initial_bytes: usize, zeroed: bool) -> Self {
        Self {
            buffer: BlobBuffer::new(1),
            len: 0,
            initial_bytes: initial_bytes.max(1),
            zeroed,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.buffer.capacity()
    }

    /// Move `value` into the segment, returning its offset.
    pub fn push<T: 'static>(&mut self, value: T) -> usize {
        let align = std::mem::align_of::<T>();
        let size = std::mem::size_of::<T>();
        if size == 0 {
            // Zero-sized values occupy no bytes; dropping one is a no-op
            // beyond its Drop impl, which the owner runs through the descriptor.
            std::mem::forget(value);
            return self.len;
        }
        let offset = (self.len + align - 1) & !(align - 1);
        let end = offset + size;
        if end > self.buffer.capacity() || align > self.buffer.align() {
            let mut target = self.buffer.capacity().max(self.initial_bytes);
            while target < end {
                target += (target / 2).max(1);
            }
            self.buffer.grow(target, align, self.len, self.zeroed);
        }
        // SAFETY: `offset..end` is in bounds and aligned for T (the buffer
        // alignment is at least align_of::<T>() and offset is a multiple of it).
        unsafe { ptr::write(self.buffer.at(offset) as *mut T, value) };
        self.len = end;
        offset
    }

    /// Typed view of a staged value.
    ///
    /// # Safety
    /// `offset` must have been returned by `push::<T>` and still be live.
    pub unsafe fn get<T: 'static>(&self, offset: usize) -> &T {
        if std::mem::size_of::<T>() == 0 {
            return &*NonNull::<T>::dangling().as_ptr();
        }
        &*(self.buffer.at(offset) as *const T)
    }

    /// # Safety
    /// Same contract as [`BlobSegment::get`].
    pub unsafe fn get_mut<T: 'static>(&mut self, offset: usize) -> &mut T {
        if std::mem::size_of::<T>() == 0 {
            return &mut *NonNull::<T>::dangling().as_ptr();
        }
        &mut *(self.buffer.at(offset) as *mut T)
    }

    /// Raw address of a staged value, for moving it into a column.
    pub fn ptr_at(&self, offset: usize) -> *const u8 {
        self.buffer.at(offset)
    }

    /// Run the descriptor's destroy hook on the staged value at `offset`.
    ///
    /// # Safety
    /// `offset` must hold a live value of the descriptor's type, which is
    /// treated as dead afterwards.
    pub unsafe fn destroy_at(&mut self, descriptor: &ComponentDescriptor, offset: usize) {
        if let Some(destroy) = descriptor.destroy_fn() {
            let at = if descriptor.size() == 0 {
                dangling(descriptor.align()).as_ptr()
            } else {
                self.buffer.at(offset)
            };
            destroy(at, 1);
        }
    }

    /// Forget every staged byte while keeping the allocation.
    pub fn reset(&mut self) {
        self.len = 0;
    }
}
