/// Declares a register map: the record struct, its static `FieldDef` table,
/// a decoder and an ordered field emitter, all from one list of rows.
///
/// Row syntax: `index => field: kind [/ divisor] [["unit"]] = "Name" [/ "LowName"];`
/// where `kind` is one of `word`, `flags`, `state`, `scaled` or `pair`.
macro_rules! register_map {
    (@type word) => { u16 };
    (@type flags) => { u16 };
    (@type state) => { $crate::status::OperatingState };
    (@type scaled) => { f64 };
    (@type pair) => { $crate::WordPair };

    (@kind word) => { $crate::FieldKind::Word };
    (@kind flags) => { $crate::FieldKind::Flags };
    (@kind state) => { $crate::FieldKind::State };
    (@kind scaled / $div:literal) => { $crate::FieldKind::Scaled { divisor: $div } };
    (@kind pair / $div:literal) => { $crate::FieldKind::Pair { divisor: $div } };

    (@unit) => { "" };
    (@unit $unit:literal) => { $unit };

    (@decode $words:ident, $index:literal, $name:literal, word) => { $words[$index] };
    (@decode $words:ident, $index:literal, $name:literal, flags) => { $words[$index] };
    (@decode $words:ident, $index:literal, $name:literal, state) => {
        $crate::status::OperatingState::try_from($words[$index]).map_err(|code| {
            $crate::DecodeError::UnknownCode {
                field: $name,
                index: $index,
                code,
            }
        })?
    };
    (@decode $words:ident, $index:literal, $name:literal, scaled / $div:literal) => {
        $crate::apply_scale($words[$index], $div)
    };
    (@decode $words:ident, $index:literal, $name:literal, pair / $div:literal) => {
        $crate::WordPair::new($words[$index], $words[$index + 1], $div)
    };

    (@emit $out:ident, $value:expr, word, $name:literal) => {
        $out.push(($name, ::types::FieldValue::from($value)))
    };
    (@emit $out:ident, $value:expr, flags, $name:literal) => {
        $out.push(($name, ::types::FieldValue::Float(f64::from($value))))
    };
    (@emit $out:ident, $value:expr, state, $name:literal) => {
        $out.push(($name, ::types::FieldValue::from($value.label())))
    };
    (@emit $out:ident, $value:expr, scaled, $name:literal) => {
        $out.push(($name, ::types::FieldValue::Float($value)))
    };
    (@emit $out:ident, $value:expr, pair, $high:literal, $low:literal) => {{
        let pair = $value;
        $out.push(($high, ::types::FieldValue::Float(pair.high_value())));
        $out.push(($low, ::types::FieldValue::Float(pair.low_value())));
    }};

    (
        $(#[$meta:meta])*
        $record:ident, $table:ident, $schema:expr;
        $(
            $index:literal => $field:ident : $kind:ident $(/ $div:literal)? $([$unit:literal])?
                = $name:literal $(/ $low:literal)?;
        )*
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq)]
        pub struct $record {
            $( pub $field: register_map!(@type $kind), )*
        }

        pub static $table: &[$crate::FieldDef] = &[
            $(
                $crate::FieldDef {
                    names: &[$name $(, $low)?],
                    index: $index,
                    kind: register_map!(@kind $kind $(/ $div)?),
                    unit: register_map!(@unit $($unit)?),
                },
            )*
        ];

        const _: () = {
            $(
                assert!(
                    $index + register_map!(@kind $kind $(/ $div)?).width() <= $schema.block_len(),
                    concat!("register row ", $name, " reads past the end of its block"),
                );
            )*
        };

        impl $record {
            pub fn decode(block: &$crate::RegisterBlock) -> Result<Self, $crate::DecodeError> {
                let words = $schema.check(block)?;
                Ok(Self {
                    $( $field: register_map!(@decode words, $index, $name, $kind $(/ $div)?), )*
                })
            }

            /// Output fields in table order.
            pub fn fields(&self) -> Vec<(&'static str, ::types::FieldValue)> {
                let mut out = Vec::with_capacity($crate::output_count($table));
                $( register_map!(@emit out, self.$field, $kind, $name $(, $low)?); )*
                out
            }
        }

        /// Serializes as a map keyed by output field name, in table order.
        impl ::serde::Serialize for $record {
            fn serialize<S: ::serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                use ::serde::ser::SerializeMap;

                let fields = self.fields();
                let mut map = serializer.serialize_map(Some(fields.len()))?;
                for (name, value) in &fields {
                    map.serialize_entry(name, value)?;
                }
                map.end()
            }
        }
    };
}
