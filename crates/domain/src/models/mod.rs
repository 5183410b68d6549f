//! Domain models for the SAR admin backend.

pub mod admin;
pub mod subject_access_request;

pub use admin::{
    AdminRequestView, AdminSearchPage, AdminSearchQuery, AdminSummary, SearchCriteria,
    StatusFilter, SummaryCounts,
};
pub use subject_access_request::{
    ClaimOutcome, CompleteSubjectAccessRequest, CreateSubjectAccessRequest, CreatedResponse,
    NewSubjectAccessRequest, Status, Subject, SubjectAccessRequest, SubjectAccessRequestResponse,
};
