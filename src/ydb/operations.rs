use super::issue::IssueMessage;
use super::status::StatusCode;

/// Long-running operation envelope. The client only ever sees operations
/// that are already ready, so `result` is unpacked immediately.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Operation {
    #[prost(string, tag = "1")]
    pub id: ::prost::alloc::string::String,
    #[prost(bool, tag = "2")]
    pub ready: bool,
    #[prost(enumeration = "StatusCode", tag = "3")]
    pub status: i32,
    #[prost(message, repeated, tag = "4")]
    pub issues: ::prost::alloc::vec::Vec<IssueMessage>,
    #[prost(message, optional, tag = "5")]
    pub result: ::core::option::Option<::prost_types::Any>,
}

