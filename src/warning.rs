//! Degraded-data notes for the product being priced.
//!
//! `enrich_page` stays a plain function returning `Option`, yet a skipped
//! product should still say why (no region names, offers without a page
//! product id, no base table). Each product task runs inside
//! [`collect_notes`], and anything recorded with [`note_product!`] while it
//! runs ends up in that product's [`ProductNotes`].

use std::cell::RefCell;

tokio::task_local! {
    static CURRENT_PRODUCT: RefCell<ProductNotes>;
}

/// Reasons a product's price data was incomplete, in the order first seen.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProductNotes(Vec<String>);

impl ProductNotes {
    fn push(&mut self, message: String) {
        if !self.0.contains(&message) {
            self.0.push(message);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    /// One-line reason for a product status.
    pub fn summary(&self) -> String {
        self.0.join("; ")
    }
}

/// Attach a note to the product currently being priced.
/// Without an enclosing [`collect_notes`] there is no product and the note
/// is discarded.
pub fn note(message: impl Into<String>) {
    let _ = CURRENT_PRODUCT.try_with(|notes| notes.borrow_mut().push(message.into()));
}

/// Price one product, returning its result together with its notes.
pub async fn collect_notes<F, T>(price: F) -> (T, ProductNotes)
where
    F: Future<Output = T>,
{
    CURRENT_PRODUCT
        .scope(RefCell::new(ProductNotes::default()), async {
            let priced = price.await;
            let notes = CURRENT_PRODUCT.with(|notes| notes.take());
            (priced, notes)
        })
        .await
}

/// `note` with `format!` arguments.
#[macro_export]
macro_rules! note_product {
    ($($arg:tt)*) => {
        $crate::warning::note(format!($($arg)*))
    };
}
