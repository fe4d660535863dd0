pub mod catalog;
pub mod chapters;
pub mod domain;
pub mod input;
pub mod memory;
pub mod ports;
pub mod validation;
pub mod versioning;

pub use catalog::{Catalog, FeedbackReceipt, WorkbookUpload};
pub use domain::{
    Collection, CollectionDetail, CollectionFilter, Feedback, FeedbackNotice, NewCollection,
    NewFeedback, NewWorkbook, User, UserCredentials, Visibility, Workbook,
};
pub use ports::{
    CollectionRepository, CredentialStore, FeedbackNotifier, FeedbackRepository, FileStorage,
    PortError, PortResult, WorkbookRepository,
};
pub use validation::FieldErrors;
