use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("{type_name} with id {id} does not exist")]
    NotFound { type_name: &'static str, id: u64 },
}
