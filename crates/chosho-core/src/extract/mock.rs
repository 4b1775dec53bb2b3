//! Mock extraction backend for testing.

use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use super::{ExtractionBackend, ExtractionError};
use crate::raster::PageImage;

/// A canned answer for [`MockBackend`].
#[derive(Clone, Debug)]
pub enum MockResponse {
    /// The model's free-text reply.
    Text(String),
    /// A transport failure.
    Error(String),
    /// A non-2xx answer from the API.
    Api { status: u16, message: String },
}

/// A hand-rolled mock implementing [`ExtractionBackend`] for tests.
///
/// Either answers every call with one response, or walks a sequence
/// (repeating the last entry once exhausted). Records the page numbers it
/// was called with.
pub struct MockBackend {
    responses: Mutex<Vec<MockResponse>>,
    fallback: MockResponse,
    call_count: AtomicUsize,
    pages_seen: Mutex<Vec<usize>>,
}

impl MockBackend {
    /// Create a mock that always returns `response`.
    pub fn new(response: MockResponse) -> Self {
        Self {
            responses: Mutex::new(Vec::new()),
            fallback: response,
            call_count: AtomicUsize::new(0),
            pages_seen: Mutex::new(Vec::new()),
        }
    }

    /// Create a mock that returns responses in order, repeating the last one.
    ///
    /// # Panics
    ///
    /// Panics if `responses` is empty.
    pub fn with_sequence(mut responses: Vec<MockResponse>) -> Self {
        let fallback = responses
            .last()
            .cloned()
            .expect("sequence must have at least one response");
        // Reverse so we can pop() from the front cheaply.
        responses.reverse();
        Self {
            responses: Mutex::new(responses),
            fallback,
            call_count: AtomicUsize::new(0),
            pages_seen: Mutex::new(Vec::new()),
        }
    }

    /// How many times `generate()` has been called.
    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }

    /// Page numbers passed to `generate()`, in call order.
    pub fn pages_seen(&self) -> Vec<usize> {
        self.pages_seen
            .lock()
            .map(|pages| pages.clone())
            .unwrap_or_default()
    }

    fn next_response(&self) -> MockResponse {
        let next = self.responses.lock().ok().and_then(|mut seq| seq.pop());
        next.unwrap_or_else(|| self.fallback.clone())
    }
}

impl ExtractionBackend for MockBackend {
    fn name(&self) -> &str {
        "Mock"
    }

    fn generate<'a>(
        &'a self,
        _prompt: &'a str,
        page: &'a PageImage,
    ) -> Pin<Box<dyn Future<Output = Result<String, ExtractionError>> + Send + 'a>> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut pages) = self.pages_seen.lock() {
            pages.push(page.page_number);
        }
        let response = self.next_response();

        Box::pin(async move {
            match response {
                MockResponse::Text(text) => Ok(text),
                MockResponse::Error(msg) => Err(ExtractionError::Http(msg)),
                MockResponse::Api { status, message } => {
                    Err(ExtractionError::Api { status, message })
                }
            }
        })
    }
}
