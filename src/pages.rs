//! Logical page sequence over a document

/// Maps user-visible (logical) page indices to document page indices.
///
/// Without a table the mapping is the identity. A table may reorder or
/// repeat document pages; entries pointing past the end of the document
/// resolve to no page and are skipped by the planner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageOrder {
    document_pages: usize,
    table: Option<Vec<usize>>,
}

impl PageOrder {
    /// Identity order over `document_pages` pages.
    #[must_use]
    pub fn identity(document_pages: usize) -> Self {
        Self {
            document_pages,
            table: None,
        }
    }

    /// Order given by an explicit table of document page indices.
    #[must_use]
    pub fn with_table(document_pages: usize, table: Vec<usize>) -> Self {
        Self {
            document_pages,
            table: Some(table),
        }
    }

    /// Number of logical pages.
    #[must_use]
    pub fn len(&self) -> usize {
        match &self.table {
            Some(table) => table.len(),
            None => self.document_pages,
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn document_pages(&self) -> usize {
        self.document_pages
    }

    /// Document page shown at `logical`, if any.
    #[must_use]
    pub fn document_page(&self, logical: usize) -> Option<usize> {
        let page = match &self.table {
            Some(table) => *table.get(logical)?,
            None => logical,
        };
        (page < self.document_pages).then_some(page)
    }

    /// First logical position showing `document_page`.
    #[must_use]
    pub fn logical_page(&self, document_page: usize) -> Option<usize> {
        match &self.table {
            Some(table) => table.iter().position(|&p| p == document_page),
            None => (document_page < self.document_pages).then_some(document_page),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_maps_in_range_only() {
        let order = PageOrder::identity(3);
        assert_eq!(order.len(), 3);
        assert_eq!(order.document_page(2), Some(2));
        assert_eq!(order.document_page(3), None);
    }

    #[test]
    fn table_reorders_and_repeats() {
        let order = PageOrder::with_table(4, vec![3, 0, 0, 9, 1]);
        assert_eq!(order.len(), 5);
        assert_eq!(order.document_page(0), Some(3));
        assert_eq!(order.document_page(2), Some(0));
        assert_eq!(order.document_page(3), None);
        assert_eq!(order.document_page(5), None);
        assert_eq!(order.logical_page(0), Some(1));
        assert_eq!(order.logical_page(2), None);
    }
}
