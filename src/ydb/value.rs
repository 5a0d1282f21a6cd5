//! Typed values used for query parameters and result rows.

/// Primitive type ids from the upstream `Ydb.Type` schema.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration,
)]
#[repr(i32)]
pub enum PrimitiveTypeId {
    PrimitiveTypeIdUnspecified = 0,
    Int32 = 1,
    Uint32 = 2,
    Int64 = 3,
    Uint64 = 4,
    Uint8 = 5,
    Bool = 6,
    Int8 = 7,
    Int16 = 8,
    Uint16 = 9,
    Double = 32,
    Float = 33,
    Date = 48,
    Datetime = 49,
    Timestamp = 50,
    Interval = 51,
    Bytes = 4097,
    Text = 4608,
    Yson = 4609,
    Json = 4610,
    JsonDocument = 4612,
}

#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration,
)]
#[repr(i32)]
pub enum NullValue {
    NullValue = 0,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Type {
    #[prost(oneof = "type_kind::Kind", tags = "1, 101")]
    pub kind: ::core::option::Option<type_kind::Kind>,
}

pub mod type_kind {
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Kind {
        #[prost(enumeration = "super::PrimitiveTypeId", tag = "1")]
        TypeId(i32),
        #[prost(message, tag = "101")]
        OptionalType(::prost::alloc::boxed::Box<super::OptionalType>),
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct OptionalType {
    #[prost(message, optional, boxed, tag = "1")]
    pub item: ::core::option::Option<::prost::alloc::boxed::Box<Type>>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Value {
    #[prost(oneof = "value::Primitive", tags = "1, 2, 3, 4, 5, 6, 7, 8, 9, 10")]
    pub value: ::core::option::Option<value::Primitive>,
    #[prost(message, repeated, tag = "12")]
    pub items: ::prost::alloc::vec::Vec<Value>,
}

pub mod value {
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Primitive {
        #[prost(bool, tag = "1")]
        BoolValue(bool),
        #[prost(int32, tag = "2")]
        Int32Value(i32),
        #[prost(uint32, tag = "3")]
        Uint32Value(u32),
        #[prost(int64, tag = "4")]
        Int64Value(i64),
        #[prost(uint64, tag = "5")]
        Uint64Value(u64),
        #[prost(float, tag = "6")]
        FloatValue(f32),
        #[prost(double, tag = "7")]
        DoubleValue(f64),
        #[prost(bytes = "vec", tag = "8")]
        BytesValue(::prost::alloc::vec::Vec<u8>),
        #[prost(string, tag = "9")]
        TextValue(::prost::alloc::string::String),
        #[prost(enumeration = "super::NullValue", tag = "10")]
        NullFlagValue(i32),
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct TypedValue {
    #[prost(message, optional, tag = "1")]
    pub r#type: ::core::option::Option<Type>,
    #[prost(message, optional, tag = "2")]
    pub value: ::core::option::Option<Value>,
}

fn primitive(id: PrimitiveTypeId, value: value::Primitive) -> TypedValue {
    TypedValue {
        r#type: Some(Type {
            kind: Some(type_kind::Kind::TypeId(id as i32)),
        }),
        value: Some(Value {
            value: Some(value),
            items: vec![],
        }),
    }
}

pub fn bool_value(v: bool) -> TypedValue {
    primitive(PrimitiveTypeId::Bool, value::Primitive::BoolValue(v))
}

pub fn int32(v: i32) -> TypedValue {
    primitive(PrimitiveTypeId::Int32, value::Primitive::Int32Value(v))
}

pub fn uint32(v: u32) -> TypedValue {
    primitive(PrimitiveTypeId::Uint32, value::Primitive::Uint32Value(v))
}

pub fn int64(v: i64) -> TypedValue {
    primitive(PrimitiveTypeId::Int64, value::Primitive::Int64Value(v))
}

pub fn uint64(v: u64) -> TypedValue {
    primitive(PrimitiveTypeId::Uint64, value::Primitive::Uint64Value(v))
}

pub fn double(v: f64) -> TypedValue {
    primitive(PrimitiveTypeId::Double, value::Primitive::DoubleValue(v))
}

pub fn text(v: impl Into<String>) -> TypedValue {
    primitive(PrimitiveTypeId::Text, value::Primitive::TextValue(v.into()))
}

pub fn bytes(v: impl Into<Vec<u8>>) -> TypedValue {
    primitive(PrimitiveTypeId::Bytes, value::Primitive::BytesValue(v.into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uint64_shape() {
        let tv = uint64(42);
        assert_eq!(
            tv.r#type.unwrap().kind,
            Some(type_kind::Kind::TypeId(PrimitiveTypeId::Uint64 as i32))
        );
        assert_eq!(
            tv.value.unwrap().value,
            Some(value::Primitive::Uint64Value(42))
        );
    }

    #[test]
    fn test_text_shape() {
        let tv = text("hello");
        assert_eq!(
            tv.value.unwrap().value,
            Some(value::Primitive::TextValue("hello".into()))
        );
    }
}
