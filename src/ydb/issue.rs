/// A server-side diagnostic attached to an operation or a result part.
/// Issues nest; the client keeps the tree intact and renders it flat.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct IssueMessage {
    #[prost(string, tag = "2")]
    pub message: ::prost::alloc::string::String,
    #[prost(uint32, tag = "4")]
    pub issue_code: u32,
    #[prost(uint32, tag = "5")]
    pub severity: u32,
    #[prost(message, repeated, tag = "6")]
    pub issues: ::prost::alloc::vec::Vec<IssueMessage>,
}
