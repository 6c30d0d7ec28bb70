use crate::serde_hex::{Hex, RsaPublicKeyHex};
use crate::util::MIN_KEY_BITS;
use crate::Error;
use rsa::traits::PublicKeyParts;
use rsa::RsaPublicKey;
use std::fs;
use std::path::Path;

/// A voter as seen by everyone else in the chain
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Voter {
    #[serde(with = "RsaPublicKeyHex")]
    pub public_key: RsaPublicKey,

    /// Where the transport can reach this voter. Unused by the in-process network.
    #[serde(default)]
    #[serde(skip_serializing_if = "String::is_empty")]
    pub address: String,
}

impl Voter {
    pub fn new(public_key: RsaPublicKey) -> Self {
        Voter {
            public_key,
            address: String::new(),
        }
    }
}

/// The voting roster.
///
/// The order of `voters` is the chain order, and every session must be started
/// with an identical configuration.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct VotingConfig {
    #[serde(default)]
    pub question: String,

    #[serde(default)]
    pub answers: Vec<String>,

    pub voters: Vec<Voter>,
}

impl VotingConfig {
    pub fn new(voters: Vec<Voter>) -> Self {
        VotingConfig {
            question: String::new(),
            answers: vec![],
            voters,
        }
    }

    /// Build a roster from public keys, in chain order
    pub fn from_public_keys<I: IntoIterator<Item = RsaPublicKey>>(keys: I) -> Self {
        Self::new(keys.into_iter().map(Voter::new).collect())
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let contents = fs::read_to_string(path)?;
        Self::from_json(&contents)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), Error> {
        fs::write(path, self.to_json()?)?;
        Ok(())
    }

    pub fn from_json(json: &str) -> Result<Self, Error> {
        let config: VotingConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String, Error> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Check the roster can drive a voting.
    ///
    /// It must be non-empty, list no key twice and only hold keys large enough to sign with.
    pub fn validate(&self) -> Result<(), Error> {
        if self.voters.is_empty() {
            return Err(Error::EmptyRoster);
        }

        for (i, voter) in self.voters.iter().enumerate() {
            let bits = voter.public_key.size() * 8;
            if bits < MIN_KEY_BITS {
                return Err(Error::KeyTooSmall(bits));
            }
            if self.voters[..i]
                .iter()
                .any(|other| other.public_key == voter.public_key)
            {
                return Err(Error::DuplicateParticipant(i));
            }
        }

        Ok(())
    }

    /// Number of voters in the chain
    pub fn len(&self) -> usize {
        self.voters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.voters.is_empty()
    }

    pub fn public_key(&self, index: usize) -> Option<&RsaPublicKey> {
        self.voters.get(index).map(|v| &v.public_key)
    }

    /// All public keys in chain order
    pub fn public_keys(&self) -> Vec<RsaPublicKey> {
        self.voters.iter().map(|v| v.public_key.clone()).collect()
    }

    /// Chain position of the voter holding this key
    pub fn position_of(&self, public_key: &RsaPublicKey) -> Option<usize> {
        self.voters.iter().position(|v| &v.public_key == public_key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::public_keys;

    #[test]
    fn test_roster_lookup() {
        let keys = public_keys(3);
        let config = VotingConfig::from_public_keys(keys.clone());

        config.validate().unwrap();
        assert_eq!(config.len(), 3);
        assert!(!config.is_empty());
        assert_eq!(config.position_of(&keys[2]), Some(2));
        assert_eq!(config.public_key(1), Some(&keys[1]));
        assert_eq!(config.public_key(3), None);
        assert_eq!(config.public_keys(), keys);

        let outsider = public_keys(4).pop().unwrap();
        assert_eq!(config.position_of(&outsider), None);
    }

    #[test]
    fn test_invalid_rosters() {
        match VotingConfig::default().validate() {
            Err(Error::EmptyRoster) => {}
            other => panic!("expected empty roster, got {:?}", other),
        }

        let keys = public_keys(2);
        let duplicated =
            VotingConfig::from_public_keys(vec![keys[0].clone(), keys[1].clone(), keys[0].clone()]);
        match duplicated.validate() {
            Err(Error::DuplicateParticipant(2)) => {}
            other => panic!("expected duplicate participant, got {:?}", other),
        }
    }

    #[test]
    fn test_json_round_trip() {
        let mut config = VotingConfig::from_public_keys(public_keys(2));
        config.question = "Who keeps the river clean?".to_string();
        config.answers = vec!["ducks".to_string(), "otters".to_string()];
        config.voters[1].address = "127.0.0.1:4692".to_string();

        let json = config.to_json().unwrap();
        assert!(json.contains("otters"));

        let parsed = VotingConfig::from_json(&json).unwrap();
        assert_eq!(parsed, config);

        // Question, answers and addresses are optional
        let minimal = format!(
            r#"{{"voters":[{{"public_key":"{}"}}]}}"#,
            hex::encode(
                rsa::pkcs8::EncodePublicKey::to_public_key_der(&config.voters[0].public_key)
                    .unwrap()
                    .as_bytes()
            )
        );
        let parsed = VotingConfig::from_json(&minimal).unwrap();
        assert_eq!(parsed.len(), 1);
        assert!(parsed.question.is_empty());

        assert!(VotingConfig::from_json(r#"{"voters":[{"public_key":"zz"}]}"#).is_err());
        assert!(VotingConfig::from_json(r#"{"voters":[]}"#).is_err());
    }
}
