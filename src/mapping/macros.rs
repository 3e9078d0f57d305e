//! Record declaration macro.
//!
//! `impl_record!` turns a mapping table into a [`Record`](crate::mapping::Record)
//! impl. The macro expands at compile time; field kinds are resolved through
//! [`NativeType`](crate::mapping::coerce::NativeType), so a field whose Rust
//! type has no store mapping fails to compile.

/// Implement [`Record`](crate::mapping::Record) for a plain struct.
///
/// Every listed field must exist on the struct with the given type. Markers
/// in brackets set the key and uniqueness flags.
///
/// # Example
///
/// ```
/// use tablemap::impl_record;
///
/// #[derive(Debug, Default, Clone, PartialEq)]
/// pub struct Post {
///     pub id: i32,
///     pub text: String,
///     pub rating: i32,
/// }
///
/// impl_record!(Post => "post" {
///     id: i32 => "post_id" [primary_key],
///     text: String => "text",
///     rating: i32 => "rating",
/// });
/// ```
#[macro_export]
macro_rules! impl_record {
    (
        $record:ty => $table:literal {
            $( $field:ident : $ty:ty => $column:literal $( [ $( $flag:ident ),+ ] )? ),+ $(,)?
        }
    ) => {
        impl $crate::mapping::Record for $record {
            fn declaration() -> $crate::mapping::RecordDeclaration {
                $crate::mapping::RecordDeclaration::new(stringify!($record), $table)
                    $(
                        .field(
                            $crate::mapping::ColumnMetadata::new(
                                stringify!($field),
                                $column,
                                <$ty as $crate::mapping::coerce::NativeType>::FIELD_TYPE,
                            )
                            $( $( .$flag() )+ )?
                        )
                    )+
            }

            fn field_value(
                &self,
                field: &str,
            ) -> $crate::error::DbResult<$crate::models::Value> {
                $(
                    if field == stringify!($field) {
                        return $crate::mapping::coerce::ToValue::to_value(&self.$field);
                    }
                )+
                Err($crate::mapping::unknown_field(stringify!($record), field))
            }

            fn set_field_value(
                &mut self,
                field: &str,
                value: $crate::models::Value,
            ) -> $crate::error::DbResult<()> {
                $(
                    if field == stringify!($field) {
                        self.$field =
                            <$ty as $crate::mapping::coerce::FromValue>::from_value(value)?;
                        return Ok(());
                    }
                )+
                Err($crate::mapping::unknown_field(stringify!($record), field))
            }
        }
    };
}

pub use impl_record;
