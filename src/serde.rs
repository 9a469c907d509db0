//! Serde support for the fixed-size identifier types.

use serde::de;
use serde::{
    Deserialize as SerdeDeserialize, Deserializer as SerdeDeserializer,
    Serialize as SerdeSerialize, Serializer as SerdeSerializer,
};

use crate::ephid::{EphemeralId, Geotag, Proof};

/// Implements byte-string serialization for a fixed-size newtype
macro_rules! serde_bytes_newtype {
    ($name:ident) => {
        impl SerdeSerialize for $name {
            fn serialize<SS>(&self, serializer: SS) -> Result<SS::Ok, SS::Error>
            where
                SS: SerdeSerializer,
            {
                serializer.serialize_bytes(self.as_bytes())
            }
        }

        impl<'de> SerdeDeserialize<'de> for $name {
            fn deserialize<SD>(deserializer: SD) -> Result<$name, SD::Error>
            where
                SD: SerdeDeserializer<'de>,
            {
                // serde_bytes handles the insane variety of formats that various serialization
                // formats present as what they think of as "bytes", like JSON's love of "a
                // sequence of numbers".
                let v: Vec<u8> = serde_bytes::deserialize(deserializer)?;
                $name::from_slice(&v).map_err(|e| de::Error::custom(e.to_string()))
            }
        }
    };
}

serde_bytes_newtype!(EphemeralId);
serde_bytes_newtype!(Geotag);
serde_bytes_newtype!(Proof);
