//! Paging of revision history.

use audit_store::SortDirection;

use crate::{Result, RevisionError};

/// The only property revision pages can be sorted by.
pub const REVISION_NUMBER_PROPERTY: &str = "revisionNumber";

/// A requested ordering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortOrder {
    property: String,
    direction: SortDirection,
}

impl SortOrder {
    pub fn new(property: impl Into<String>, direction: SortDirection) -> Self {
        Self {
            property: property.into(),
            direction,
        }
    }

    pub fn asc(property: impl Into<String>) -> Self {
        Self::new(property, SortDirection::Ascending)
    }

    pub fn desc(property: impl Into<String>) -> Self {
        Self::new(property, SortDirection::Descending)
    }

    /// Orders by revision number.
    pub fn by_revision_number(direction: SortDirection) -> Self {
        Self::new(REVISION_NUMBER_PROPERTY, direction)
    }

    pub fn property(&self) -> &str {
        &self.property
    }

    pub fn direction(&self) -> SortDirection {
        self.direction
    }
}

/// A zero-based page index, a page size and an optional ordering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    page: usize,
    size: usize,
    sort: Option<SortOrder>,
}

impl PageRequest {
    /// Requests page `page` of `size` elements, unsorted.
    pub fn of(page: usize, size: usize) -> Result<Self> {
        if size == 0 {
            return Err(RevisionError::InvalidArgument(
                "page size must be at least one".to_string(),
            ));
        }
        Ok(Self {
            page,
            size,
            sort: None,
        })
    }

    pub fn with_sort(mut self, sort: SortOrder) -> Self {
        self.sort = Some(sort);
        self
    }

    pub fn page(&self) -> usize {
        self.page
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn sort(&self) -> Option<&SortOrder> {
        self.sort.as_ref()
    }

    /// Index of the first element of this page.
    pub fn offset(&self) -> Result<u64> {
        let offset = self
            .page
            .checked_mul(self.size)
            .ok_or_else(|| RevisionError::NumericOverflow {
                value: format!("{} * {}", self.page, self.size),
                target: "usize",
            })?;
        u64::try_from(offset).map_err(|_| RevisionError::NumericOverflow {
            value: offset.to_string(),
            target: "u64",
        })
    }

    /// Direction in which revision numbers are ordered on this page.
    ///
    /// Unsorted requests are ascending. Any property other than the revision
    /// number is rejected.
    pub fn revision_direction(&self) -> Result<SortDirection> {
        match &self.sort {
            None => Ok(SortDirection::Ascending),
            Some(order) if order.property == REVISION_NUMBER_PROPERTY => Ok(order.direction),
            Some(order) => Err(RevisionError::UnsupportedSort(order.property.clone())),
        }
    }

    /// The request for the following page, keeping size and ordering.
    pub fn next(&self) -> Result<Self> {
        let page = self
            .page
            .checked_add(1)
            .ok_or_else(|| RevisionError::NumericOverflow {
                value: self.page.to_string(),
                target: "usize",
            })?;
        Ok(Self {
            page,
            ..self.clone()
        })
    }

    /// The request for the preceding page, or the first page.
    pub fn previous_or_first(&self) -> Self {
        Self {
            page: self.page.saturating_sub(1),
            ..self.clone()
        }
    }
}

/// One page of results plus the total element count.
#[derive(Debug, Clone)]
pub struct Page<T> {
    content: Vec<T>,
    request: PageRequest,
    total_elements: u64,
}

impl<T> Page<T> {
    pub fn new(content: Vec<T>, request: PageRequest, total_elements: u64) -> Self {
        Self {
            content,
            request,
            total_elements,
        }
    }

    /// A page without content.
    pub fn empty(request: PageRequest, total_elements: u64) -> Self {
        Self::new(Vec::new(), request, total_elements)
    }

    pub fn content(&self) -> &[T] {
        &self.content
    }

    pub fn request(&self) -> &PageRequest {
        &self.request
    }

    /// Zero-based page index.
    pub fn number(&self) -> usize {
        self.request.page
    }

    pub fn size(&self) -> usize {
        self.request.size
    }

    pub fn total_elements(&self) -> u64 {
        self.total_elements
    }

    pub fn total_pages(&self) -> u64 {
        self.total_elements.div_ceil(self.request.size as u64)
    }

    pub fn number_of_elements(&self) -> usize {
        self.content.len()
    }

    pub fn has_content(&self) -> bool {
        !self.content.is_empty()
    }

    pub fn is_first(&self) -> bool {
        self.request.page == 0
    }

    pub fn is_last(&self) -> bool {
        !self.has_next()
    }

    pub fn has_next(&self) -> bool {
        (self.request.page as u64).saturating_add(1) < self.total_pages()
    }

    pub fn has_previous(&self) -> bool {
        self.request.page > 0
    }

    /// The request for the next page, if there is one.
    pub fn next_page_request(&self) -> Option<PageRequest> {
        if self.has_next() {
            self.request.next().ok()
        } else {
            None
        }
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            content: self.content.into_iter().map(f).collect(),
            request: self.request,
            total_elements: self.total_elements,
        }
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.content.iter()
    }
}

impl<T> IntoIterator for Page<T> {
    type Item = T;
    type IntoIter = std::vec::IntoIter<T>;

    fn into_iter(self) -> Self::IntoIter {
        self.content.into_iter()
    }
}
