//! `DigitalIdentity` contract ABI
//!
//! Calldata builders for the three registry functions and the decoder for
//! `getIdentity` return data.

use ethers_core::abi::{self, ParamType, Token};
use ethers_core::types::Address;
use ethers_core::utils::id;

pub const REGISTER_IDENTITY: &str = "registerIdentity(string,string)";
pub const UPDATE_IDENTITY: &str = "updateIdentity(string,string)";
pub const GET_IDENTITY: &str = "getIdentity(address)";

/// Decoded `getIdentity` result
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityFields {
    pub name: String,
    pub email: String,
    pub is_registered: bool,
}

pub fn register_identity_calldata(name: &str, email: &str) -> Vec<u8> {
    encode_call(REGISTER_IDENTITY, &[Token::String(name.to_string()), Token::String(email.to_string())])
}

pub fn update_identity_calldata(name: &str, email: &str) -> Vec<u8> {
    encode_call(UPDATE_IDENTITY, &[Token::String(name.to_string()), Token::String(email.to_string())])
}

pub fn get_identity_calldata(owner: Address) -> Vec<u8> {
    encode_call(GET_IDENTITY, &[Token::Address(owner)])
}

fn encode_call(signature: &str, args: &[Token]) -> Vec<u8> {
    let mut data = id(signature).to_vec();
    data.extend(abi::encode(args));
    data
}

/// Decode `getIdentity` return data.
///
/// The contract returns an `Identity` struct, encoded as a single tuple.
/// Deployments that return the three fields separately are accepted too.
pub fn decode_identity(data: &[u8]) -> Result<IdentityFields, abi::Error> {
    let fields = vec![ParamType::String, ParamType::String, ParamType::Bool];
    let head = data.get(..32).ok_or(abi::Error::InvalidData)?;

    // A struct return starts with the offset of the tuple (0x20); a flat
    // return starts with the offset of `name`, which follows three head words.
    let tokens = if head[..31].iter().all(|b| *b == 0) && head[31] == 0x20 {
        match abi::decode(&[ParamType::Tuple(fields)], data)?.pop() {
            Some(Token::Tuple(inner)) => inner,
            _ => return Err(abi::Error::InvalidData),
        }
    } else {
        abi::decode(&fields, data)?
    };

    match tokens.as_slice() {
        [Token::String(name), Token::String(email), Token::Bool(is_registered)] => {
            Ok(IdentityFields {
                name: name.clone(),
                email: email.clone(),
                is_registered: *is_registered,
            })
        }
        _ => Err(abi::Error::InvalidData),
    }
}

/// Encode `getIdentity` return data as the contract does
#[cfg(test)]
pub fn encode_identity(fields: &IdentityFields) -> Vec<u8> {
    abi::encode(&[Token::Tuple(vec![
        Token::String(fields.name.clone()),
        Token::String(fields.email.clone()),
        Token::Bool(fields.is_registered),
    ])])
}

/// A decoded call against the registry
#[cfg(test)]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryCall {
    Register { name: String, email: String },
    Update { name: String, email: String },
    Get { owner: Address },
}

/// Decode calldata produced by the builders above
#[cfg(test)]
pub fn decode_call(data: &[u8]) -> Result<RegistryCall, abi::Error> {
    if data.len() < 4 {
        return Err(abi::Error::InvalidData);
    }
    let (selector, args) = data.split_at(4);
    let strings = [ParamType::String, ParamType::String];

    if selector == id(REGISTER_IDENTITY) || selector == id(UPDATE_IDENTITY) {
        let (name, email) = match abi::decode(&strings, args)?.as_slice() {
            [Token::String(name), Token::String(email)] => (name.clone(), email.clone()),
            _ => return Err(abi::Error::InvalidData),
        };
        if selector == id(REGISTER_IDENTITY) {
            Ok(RegistryCall::Register { name, email })
        } else {
            Ok(RegistryCall::Update { name, email })
        }
    } else if selector == id(GET_IDENTITY) {
        match abi::decode(&[ParamType::Address], args)?.as_slice() {
            [Token::Address(owner)] => Ok(RegistryCall::Get { owner: *owner }),
            _ => Err(abi::Error::InvalidData),
        }
    } else {
        Err(abi::Error::InvalidData)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_selectors() {
        assert_eq!(
            hex::encode(&register_identity_calldata("a", "b")[..4]),
            hex::encode(id(REGISTER_IDENTITY))
        );
        assert_ne!(id(REGISTER_IDENTITY), id(UPDATE_IDENTITY));
    }

    #[test]
    fn test_decode_struct_return() {
        let fields = IdentityFields {
            name: "Alice".to_string(),
            email: "a@x.com".to_string(),
            is_registered: true,
        };
        assert_eq!(decode_identity(&encode_identity(&fields)).unwrap(), fields);
    }

    #[test]
    fn test_decode_flat_return() {
        let data = abi::encode(&[
            Token::String("Bob".to_string()),
            Token::String("b@x.com".to_string()),
            Token::Bool(false),
        ]);
        let fields = decode_identity(&data).unwrap();
        assert_eq!(fields.name, "Bob");
        assert!(!fields.is_registered);
    }

    #[test]
    fn test_decode_garbage_fails() {
        assert!(decode_identity(&[0u8; 3]).is_err());
        assert!(decode_call(&[0x12, 0x34]).is_err());
    }

    #[test]
    fn test_decode_update_call() {
        let data = update_identity_calldata("Carol", "c@x.com");
        assert_eq!(
            decode_call(&data).unwrap(),
            RegistryCall::Update {
                name: "Carol".to_string(),
                email: "c@x.com".to_string()
            }
        );
    }
}
