//! Catalog transports. Records talk to [`clint_domain::Catalog`]; this
//! module supplies the HTTP implementation used outside of tests.

mod http;

pub use http::HttpCatalog;
