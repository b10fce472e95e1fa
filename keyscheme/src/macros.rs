/// Builds a [`KeyArgs`](crate::KeyArgs) from `name = value` pairs.
///
/// Values go through [`PartValue`](crate::PartValue)'s `From` impls, so
/// integers, strings and [`PartValue::Wildcard`](crate::PartValue::Wildcard)
/// can be mixed freely.
///
/// # Example
///
/// ```rust
/// use keyscheme::{key_args, KeyPart, KeyScheme, PartValue};
///
/// let scheme = KeyScheme::new([KeyPart::int("user"), KeyPart::string("job")]).unwrap();
///
/// let args = key_args!(user = 7, job = "import");
/// assert_eq!(scheme.get_key(false, &args).unwrap(), "user:7:job:import");
///
/// let pattern = key_args!(user = 7, job = PartValue::Wildcard);
/// assert_eq!(scheme.get_key(true, &pattern).unwrap(), "user:7:job:*");
///
/// assert!(key_args!().is_empty());
/// ```
#[macro_export]
macro_rules! key_args {
    () => {
        $crate::KeyArgs::new()
    };

    ($($name:ident = $value:expr),+ $(,)?) => {
        $crate::KeyArgs::new()$(.with(stringify!($name), $value))+
    };
}
