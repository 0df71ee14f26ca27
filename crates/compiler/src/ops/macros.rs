//! Macros for the operator translator registry

/// Generate the `OperatorKind` registry with dispatch to each translator
///
/// Every entry names the variant, the source operator name it is keyed by,
/// and the module holding that operator's `infer` and `construct` rules.
///
/// # Example
///
/// ```text
/// define_translators! {
///     /// Quantized concatenation
///     Concatenate("qnn.concatenate") => concatenate,
///     Split("split") => split,
/// }
/// ```
///
/// Adding an operator is one line here plus its module; a missing rule is a
/// compile error rather than a forgotten match arm.
#[macro_export]
macro_rules! define_translators {
    (
        $(
            $(#[$variant_meta:meta])*
            $variant:ident($name:literal) => $module:ident
        ),* $(,)?
    ) => {
        /// Closed set of operators the accelerator can lower
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum OperatorKind {
            $(
                $(#[$variant_meta])*
                $variant,
            )*
        }

        impl OperatorKind {
            /// Every supported operator
            pub const ALL: &'static [OperatorKind] = &[$(OperatorKind::$variant),*];

            /// Look up the translator for a source operator name
            pub fn from_name(name: &str) -> Option<Self> {
                match name {
                    $($name => Some(OperatorKind::$variant),)*
                    _ => None,
                }
            }

            /// Source operator name
            pub fn name(self) -> &'static str {
                match self {
                    $(OperatorKind::$variant => $name,)*
                }
            }

            /// Derive descriptors for the call's arguments from what is known about the call
            pub fn infer(
                self,
                call: &$crate::ops::CallNode<'_>,
                descriptors: &$crate::passes::infer::DescriptorTable,
            ) -> ::std::result::Result<$crate::ops::ArgumentDescriptors, $crate::error::AttributeError> {
                match self {
                    $(OperatorKind::$variant => $module::infer(call, descriptors),)*
                }
            }

            /// Add the call to `network`, reading argument operands from `operands`
            pub fn construct<N: $crate::support::Network + ?Sized>(
                self,
                call: &$crate::ops::CallNode<'_>,
                operands: &$crate::passes::construct::OperandTable,
                network: &mut N,
            ) -> ::std::result::Result<$crate::support::OperandsAndId, $crate::ops::ConstructError> {
                match self {
                    $(OperatorKind::$variant => $module::construct(call, operands, network),)*
                }
            }
        }

        impl ::std::fmt::Display for OperatorKind {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                f.write_str(self.name())
            }
        }
    };
}
