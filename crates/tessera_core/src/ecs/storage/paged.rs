use std::ops::{Index, IndexMut};

/// Append-only store that hides individual pages and acts like a contiguous array.
///
/// Pages are allocated with a fixed row count and never reallocated, so an
/// element's address is stable for the life of the store. Indices are split
/// into page/local parts with a shift and mask.
pub struct PagedStore<T> {
    rows_per_page: usize,
    shift: u32,
    mask: usize,
    pages: Vec<Vec<T>>,
    len: usize,
}

impl<T> PagedStore<T> {
    /// `rows_per_page` must be a non-zero power of two.
    pub fn with_rows_per_page(rows_per_page: usize) -> Self {
        assert!(rows_per_page.is_power_of_two() && rows_per_page > 0);
        Self {
            rows_per_page,
            shift: rows_per_page.trailing_zeros(),
            mask: rows_per_page - 1,
            pages: Vec::new(),
            len: 0,
        }
    }

    #[inline]
    pub fn rows_per_page(&self) -> usize {
        self.rows_per_page
    }

    #[inline]
    fn page_of(&self, gidx: usize) -> usize {
        gidx >> self.shift
    }

    #[inline]
    fn local_of(&self, gidx: usize) -> usize {
        gidx & self.mask
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of rows the allocated pages can hold.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.pages.len() * self.rows_per_page
    }

    /// Append a value, returning its global index.
    pub fn push(&mut self, value: T) -> usize {
        let gidx = self.len;
        if self.page_of(gidx) == self.pages.len() {
            self.pages.push(Vec::with_capacity(self.rows_per_page));
        }
        let page = self.page_of(gidx);
        let page = &mut self.pages[page];
        debug_assert!(page.len() < page.capacity(), "page would reallocate");
        page.push(value);
        self.len += 1;
        gidx
    }

    pub fn get(&self, gidx: usize) -> Option<&T> {
        if gidx >= self.len {
            return None;
        }
        self.pages
            .get(self.page_of(gidx))
            .and_then(|page| page.get(self.local_of(gidx)))
    }

    pub fn get_mut(&mut self, gidx: usize) -> Option<&mut T> {
        if gidx >= self.len {
            return None;
        }
        let (page, local) = (self.page_of(gidx), self.local_of(gidx));
        self.pages.get_mut(page).and_then(|page| page.get_mut(local))
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.pages.iter().flatten()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut T> {
        self.pages.iter_mut().flatten()
    }
}

impl<T> Index<usize> for PagedStore<T> {
    type Output = T;

    fn index(&self, gidx: usize) -> &T {
        self.get(gidx)
            .unwrap_or_else(|| panic!("index {gidx} out of bounds (len {})", self.len))
    }
}

impl<T> IndexMut<usize> for PagedStore<T> {
    fn index_mut(&mut self, gidx: usize) -> &mut T {
        let len = self.len;
        self.get_mut(gidx)
            .unwrap_or_else(|| panic!("index {gidx} out of bounds (len {len})"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn addresses_are_stable_across_pages() {
        let mut store = PagedStore::with_rows_per_page(4);
        store.push(0u32);
        let first = store.get(0).map(|v| v as *const u32);
        for i in 1..64 {
            assert_eq!(store.push(i), i as usize);
        }
        assert_eq!(store.get(0).map(|v| v as *const u32), first);
        assert_eq!(store.len(), 64);
        assert_eq!(store.capacity(), 64);
        assert_eq!(store[37], 37);
        assert_eq!(store.get(64), None);
    }

    #[test]
    fn iteration_visits_every_row_in_order() {
        let mut store = PagedStore::with_rows_per_page(2);
        for i in 0..5u32 {
            store.push(i);
        }
        for value in store.iter_mut() {
            *value *= 10;
        }
        assert_eq!(store.iter().copied().collect::<Vec<_>>(), vec![0, 10, 20, 30, 40]);
    }

    #[test]
    #[should_panic]
    fn rejects_non_power_of_two_pages() {
        let _ = PagedStore::<u8>::with_rows_per_page(3);
    }
}
