pub const ESI_URL: &str = "https://esi.evetech.net/latest";

/// Prepend the ESI base URL to a `format!`-style string.
///
/// # Examples
///
/// ```rust
/// # #![allow(unused_must_use)]
/// let character_id = 90000001;
/// let url = esi::esi_url!("/characters/{}/", character_id);
/// assert_eq!(url, "https://esi.evetech.net/latest/characters/90000001/");
/// ```
#[macro_export]
macro_rules! esi_url {
    ($fmt:literal, $($args:expr),+ $(,)?) => {
        format!(
            concat!(ESI_URL, $fmt),
            $($args),+
        )
    };
    ($fmt:literal $(,)?) => {
        format!(concat!(ESI_URL, $fmt))
    };
}
