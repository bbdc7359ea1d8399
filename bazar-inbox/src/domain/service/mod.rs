pub mod inbox_domain_service;

pub use inbox_domain_service::InboxDomainService;
