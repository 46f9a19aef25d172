pub const CHAT_BINARY_NAME: &str = "gracii";

pub const PRODUCT_NAME: &str = "Gracii";

/// Backend used when nothing else is configured.
pub const DEFAULT_ENDPOINT: &str = "http://localhost:8000";

pub mod env_var {
    macro_rules! define_env_vars {
        ($($(#[$meta:meta])* $ident:ident = $name:expr),*) => {
            $(
                $(#[$meta])*
                pub const $ident: &str = $name;
            )*

            pub const ALL: &[&str] = &[$($ident),*];
        }
    }

    define_env_vars! {
        /// Sets the current log level
        GRACII_LOG_LEVEL = "GRACII_LOG_LEVEL",

        /// Mirrors logs to stdout when set
        GRACII_LOG_STDOUT = "GRACII_LOG_STDOUT",

        /// Overrides the chat backend address
        GRACII_ENDPOINT = "GRACII_ENDPOINT"
    }
}
