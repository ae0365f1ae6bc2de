pub mod doc_store;

pub use doc_store::{DocumentStore, InMemoryDocumentStore, StoreError};
