#![forbid(unsafe_code)]

//! Typed topic keys.
//!
//! On the wire a topic is a bare string, and two bindings that happen to use
//! the same string share state. To keep that collision surface visible,
//! applications declare their topics once as an enum (usually via
//! [`topics!`](crate::topics)) and pass variants to [`bind`](crate::bind).
//! The string form is validated when the binding is created.

use crate::error::TopicError;
use std::fmt;
use std::rc::Rc;

/// Maximum encoded length of a topic, in bytes.
pub const MAX_TOPIC_LEN: usize = 256;

/// Anything that names a shared value.
pub trait TopicKey {
    /// Wire representation of the topic.
    fn as_str(&self) -> &str;
}

impl TopicKey for str {
    fn as_str(&self) -> &str {
        self
    }
}

impl TopicKey for &str {
    fn as_str(&self) -> &str {
        self
    }
}

impl TopicKey for String {
    fn as_str(&self) -> &str {
        self.as_str()
    }
}

/// A validated topic name.
///
/// Cheap to clone; the string is shared.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Topic(Rc<str>);

impl Topic {
    /// Validate a topic name.
    ///
    /// Rejects empty names, names longer than [`MAX_TOPIC_LEN`] bytes, control
    /// characters, and leading or trailing whitespace.
    pub fn new(name: &str) -> Result<Self, TopicError> {
        if name.is_empty() {
            return Err(TopicError::Empty);
        }
        if name.len() > MAX_TOPIC_LEN {
            return Err(TopicError::TooLong {
                len: name.len(),
                max: MAX_TOPIC_LEN,
            });
        }
        if let Some((offset, _)) = name.char_indices().find(|(_, c)| c.is_control()) {
            return Err(TopicError::ControlCharacter { offset });
        }
        if name.trim() != name {
            return Err(TopicError::SurroundingWhitespace);
        }
        Ok(Self(Rc::from(name)))
    }

    /// Validate the wire form of a typed key.
    pub fn from_key<K: TopicKey + ?Sized>(key: &K) -> Result<Self, TopicError> {
        Self::new(key.as_str())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TopicKey for Topic {
    fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Topic").field(&&*self.0).finish()
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Topic {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Declare an enum of topic keys with their wire names.
///
/// ```
/// tabsync::topics! {
///     /// Values shared by the settings screen.
///     pub enum SettingsTopic {
///         Theme => "settings.theme",
///         Locale => "settings.locale",
///     }
/// }
///
/// use tabsync::TopicKey;
/// assert_eq!(SettingsTopic::Theme.as_str(), "settings.theme");
/// assert_eq!(SettingsTopic::ALL.len(), 2);
/// ```
#[macro_export]
macro_rules! topics {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident {
            $( $(#[$vmeta:meta])* $variant:ident => $wire:literal ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        $vis enum $name {
            $( $(#[$vmeta])* $variant ),+
        }

        impl $name {
            /// Every declared topic, in declaration order.
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            #[must_use]
            pub const fn wire_name(self) -> &'static str {
                match self {
                    $( $name::$variant => $wire ),+
                }
            }
        }

        impl $crate::TopicKey for $name {
            fn as_str(&self) -> &str {
                self.wire_name()
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    crate::topics! {
        enum Demo {
            Counter => "demo.counter",
            Cart => "demo.cart",
        }
    }

    #[test]
    fn accepts_plain_names() {
        let topic = Topic::new("cart.items").unwrap();
        assert_eq!(topic.as_str(), "cart.items");
        assert_eq!(topic.to_string(), "cart.items");
        assert_eq!(format!("{topic:?}"), "Topic(\"cart.items\")");
    }

    #[test]
    fn rejects_empty() {
        assert_eq!(Topic::new(""), Err(TopicError::Empty));
    }

    #[test]
    fn rejects_long_names() {
        let name = "x".repeat(MAX_TOPIC_LEN + 1);
        assert_eq!(
            Topic::new(&name),
            Err(TopicError::TooLong {
                len: MAX_TOPIC_LEN + 1,
                max: MAX_TOPIC_LEN
            })
        );
        assert!(Topic::new(&"x".repeat(MAX_TOPIC_LEN)).is_ok());
    }

    #[test]
    fn rejects_control_characters() {
        assert_eq!(
            Topic::new("ab\ncd"),
            Err(TopicError::ControlCharacter { offset: 2 })
        );
    }

    #[test]
    fn rejects_surrounding_whitespace() {
        assert_eq!(Topic::new(" t"), Err(TopicError::SurroundingWhitespace));
        assert_eq!(Topic::new("t "), Err(TopicError::SurroundingWhitespace));
        assert!(Topic::new("a b").is_ok());
    }

    #[test]
    fn macro_generates_keys() {
        assert_eq!(Demo::Counter.as_str(), "demo.counter");
        assert_eq!(Demo::ALL, &[Demo::Counter, Demo::Cart]);
        let topic = Topic::from_key(&Demo::Cart).unwrap();
        assert_eq!(topic.as_str(), "demo.cart");
    }

    #[test]
    fn clones_share_storage() {
        let a = Topic::new("shared").unwrap();
        let b = a.clone();
        assert_eq!(a, b);
        assert!(std::ptr::eq(a.as_str(), b.as_str()));
    }
}
