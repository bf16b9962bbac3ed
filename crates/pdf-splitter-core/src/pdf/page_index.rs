//! Page index newtype for safe conversion between usize and i32.
//!
//! MuPDF addresses pages with a zero-based i32, lopdf with a one-based u32,
//! and artifacts are numbered from 1. This type keeps those conversions in
//! one place.

use std::fmt;

use crate::error::Error;

/// A validated zero-based page index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PageIndex(i32);

impl PageIndex {
    #[must_use]
    pub const fn new(index: i32) -> Self {
        Self(index)
    }

    #[must_use]
    pub const fn as_i32(self) -> i32 {
        self.0
    }

    #[must_use]
    #[allow(clippy::cast_sign_loss)] // Safe: we check for negative values
    pub const fn as_usize(self) -> usize {
        if self.0 < 0 {
            0
        } else {
            self.0 as usize
        }
    }

    /// The 1-based page number used by lopdf's page map.
    #[must_use]
    pub const fn as_lopdf_page_number(self) -> u32 {
        (self.0 + 1).cast_unsigned()
    }

    /// The 1-based number of the artifact produced for this page.
    #[must_use]
    pub const fn artifact_number(self) -> usize {
        self.as_usize() + 1
    }

    /// Validate a page number against the document's page count.
    pub fn try_from_page_num(page_num: usize, total_pages: usize) -> Result<Self, Error> {
        if page_num >= total_pages {
            return Err(Error::PdfInvalidPage {
                page: page_num,
                total: total_pages,
            });
        }

        let index = i32::try_from(page_num).map_err(|_| Error::PdfInvalidPage {
            page: page_num,
            total: total_pages,
        })?;

        Ok(Self(index))
    }
}

impl From<PageIndex> for i32 {
    fn from(index: PageIndex) -> Self {
        index.0
    }
}

impl fmt::Display for PageIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
