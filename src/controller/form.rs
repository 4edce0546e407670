//! Add-bookmark form fields and submission validation

use url::Url;
use uuid::Uuid;

use crate::model::NewBookmark;

/// Why a submission was not sent to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddRejection {
    /// Title or URL is empty after trimming.
    MissingField,
    /// URL is not an absolute `http` or `https` URL.
    InvalidUrl,
    /// Another submission is still in flight.
    InFlight,
}

/// Whether `raw` is an absolute `http` or `https` URL.
///
/// Other schemes (`javascript:`, `data:`, `file:`) are never saved or
/// rendered as links.
pub fn is_web_url(raw: &str) -> bool {
    Url::parse(raw).is_ok_and(|url| matches!(url.scheme(), "http" | "https"))
}

/// Current contents of the add form.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AddForm {
    pub title: String,
    pub url: String,
}

impl AddForm {
    /// Validates the fields and builds the trimmed insert row for `owner`.
    ///
    /// # Examples
    ///
    /// ```
    /// use bookmark_manager::controller::form::{AddForm, AddRejection};
    /// use uuid::Uuid;
    ///
    /// let form = AddForm {
    ///     title: "  Rust  ".to_string(),
    ///     url: " https://www.rust-lang.org ".to_string(),
    /// };
    /// let row = form.to_row(Uuid::nil()).unwrap();
    /// assert_eq!(row.title, "Rust");
    /// assert_eq!(row.url, "https://www.rust-lang.org");
    ///
    /// let empty = AddForm { title: "   ".to_string(), url: String::new() };
    /// assert_eq!(empty.to_row(Uuid::nil()), Err(AddRejection::MissingField));
    /// ```
    pub fn to_row(&self, owner: Uuid) -> Result<NewBookmark, AddRejection> {
        let title = self.title.trim();
        let url = self.url.trim();
        if title.is_empty() || url.is_empty() {
            return Err(AddRejection::MissingField);
        }
        if !is_web_url(url) {
            return Err(AddRejection::InvalidUrl);
        }
        Ok(NewBookmark {
            url: url.to_string(),
            title: title.to_string(),
            user_id: owner,
        })
    }

    pub fn clear(&mut self) {
        self.title.clear();
        self.url.clear();
    }
}
