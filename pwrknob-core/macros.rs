//! Declarative macros to reduce boilerplate across the pwrknob codebase

/// Define a closed identifier enum with `name()`, `from_name()` and
/// `all()` implementations.
///
/// # Example
/// ```
/// use pwrknob::knob_enum;
///
/// knob_enum! {
///     pub enum Channel {
///         Sysfs => "sysfs",
///         Msr => "msr",
///     }
/// }
///
/// assert_eq!(Channel::Msr.name(), "msr");
/// assert_eq!(Channel::from_name("sysfs"), Some(Channel::Sysfs));
/// assert_eq!(Channel::all().len(), 2);
/// ```
#[macro_export]
macro_rules! knob_enum {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident {
            $($(#[$vmeta:meta])* $variant:ident => $str:literal),* $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        $vis enum $name {
            $($(#[$vmeta])* $variant,)*
        }

        impl $name {
            pub fn name(&self) -> &'static str {
                match self {
                    $($name::$variant => $str,)*
                }
            }

            pub fn from_name(name: &str) -> Option<$name> {
                match name {
                    $($str => Some($name::$variant),)*
                    _ => None,
                }
            }

            pub fn all() -> Vec<$name> {
                vec![$($name::$variant,)*]
            }
        }
    };
}
