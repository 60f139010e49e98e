// Copyright 2024 Cornell University
// released under BSD 3-Clause License
// author: Kevin Laeufer <laeufer@cornell.edu>

use crate::error::{Diagnostics, Error, Result, Warning};
use indexmap::IndexMap;
use lazy_static::lazy_static;
use regex::Regex;
use sha1::Sha1;
use sha2::{Digest, Sha256};

/// Keys that have to be present before anything else is looked at.
pub const MANDATORY_KEYS: [&str; 4] = [
    "witness-type",
    "sourcecodelang",
    "architecture",
    "programhash",
];

lazy_static! {
    static ref SPECIFICATION: Regex =
        Regex::new(r"^CHECK\(init\((\S+?)\(\)\),LTL\((\S+)\)\)").unwrap();
}

/// Graph level key/value data of a witness. A repeated key overwrites the earlier value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WitnessConfig {
    entries: IndexMap<String, String>,
}

/// The function verification starts in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntrySpec {
    pub function: String,
    pub property: String,
}

impl WitnessConfig {
    pub fn insert(&mut self, key: &str, value: &str) {
        self.entries.insert(key.to_string(), value.to_string());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(|v| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Checks the metadata against the benchmark and extracts the entry function.
    /// `bitwidth == None` accepts any architecture.
    pub fn validate(
        &self,
        benchmark: &[u8],
        bitwidth: Option<u32>,
        diag: &mut Diagnostics,
    ) -> Result<EntrySpec> {
        for key in MANDATORY_KEYS {
            if self.get(key).is_none() {
                return Err(Error::malformed(format!("missing mandatory key `{key}`")));
            }
        }
        let witness_type = self.mandatory("witness-type")?;
        if witness_type != "violation_witness" {
            return Err(Error::unsupported(format!(
                "witness type `{witness_type}`, only violation_witness is supported"
            )));
        }
        let lang = self.mandatory("sourcecodelang")?;
        if lang != "C" {
            return Err(Error::unsupported(format!(
                "source language `{lang}`, only C is supported"
            )));
        }
        let architecture = self.mandatory("architecture")?;
        match bitwidth {
            Some(m) if architecture != format!("{m}bit") => {
                return Err(Error::unsupported(format!(
                    "architecture `{architecture}` does not match expected {m}bit"
                )));
            }
            Some(_) => {}
            None => tracing::debug!("architecture `{architecture}` accepted without check"),
        }
        let declared = self.mandatory("programhash")?;
        let actual = program_hash(benchmark, declared);
        if !declared.eq_ignore_ascii_case(&actual) {
            diag.warn(Warning::ProgramHashMismatch {
                declared: declared.to_string(),
                actual,
            });
        }
        let spec = self
            .get("specification")
            .ok_or_else(|| Error::malformed("missing key `specification`"))?;
        parse_specification(spec)
    }

    fn mandatory(&self, key: &str) -> Result<&str> {
        self.get(key)
            .ok_or_else(|| Error::malformed(format!("missing mandatory key `{key}`")))
    }
}

/// Hashes the benchmark the same way the witness producer did: SHA-256 when the declared
/// hash has 64 digits, SHA-1 otherwise.
pub fn program_hash(benchmark: &[u8], declared: &str) -> String {
    if declared.len() == 64 {
        hex::encode(Sha256::digest(benchmark))
    } else {
        hex::encode(Sha1::digest(benchmark))
    }
}

fn parse_specification(spec: &str) -> Result<EntrySpec> {
    let compact: String = spec.chars().filter(|c| !c.is_whitespace()).collect();
    let captures = SPECIFICATION
        .captures(&compact)
        .ok_or_else(|| Error::malformed(format!("unrecognized specification `{spec}`")))?;
    Ok(EntrySpec {
        function: captures[1].to_string(),
        property: captures[2].to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const PROGRAM: &[u8] = b"int main(void) { return 0; }\n";

    fn config(hash: &str) -> WitnessConfig {
        let mut c = WitnessConfig::default();
        c.insert("witness-type", "violation_witness");
        c.insert("sourcecodelang", "C");
        c.insert("architecture", "32bit");
        c.insert("programhash", hash);
        c.insert(
            "specification",
            "CHECK( init(main()), LTL(G ! call(reach_error())) )",
        );
        c
    }

    fn sha1_of_program() -> String {
        hex::encode(Sha1::digest(PROGRAM))
    }

    #[test]
    fn accepts_matching_witness() {
        let mut diag = Diagnostics::default();
        let entry = config(&sha1_of_program())
            .validate(PROGRAM, Some(32), &mut diag)
            .unwrap();
        assert_eq!(entry.function, "main");
        assert_eq!(entry.property, "G!call(reach_error())");
        assert!(diag.warnings().is_empty());
    }

    #[test]
    fn hash_is_case_insensitive_and_may_be_sha256() {
        let mut diag = Diagnostics::default();
        let upper = sha1_of_program().to_uppercase();
        config(&upper).validate(PROGRAM, None, &mut diag).unwrap();
        let sha256 = hex::encode(Sha256::digest(PROGRAM));
        config(&sha256).validate(PROGRAM, None, &mut diag).unwrap();
        assert!(diag.warnings().is_empty());
    }

    #[test]
    fn hash_mismatch_only_warns() {
        let mut diag = Diagnostics::default();
        let entry = config("0000").validate(PROGRAM, Some(32), &mut diag).unwrap();
        assert_eq!(entry.function, "main");
        assert!(matches!(
            diag.warnings(),
            [Warning::ProgramHashMismatch { .. }]
        ));
    }

    #[test]
    fn missing_keys_are_malformed() {
        for key in MANDATORY_KEYS {
            let mut c = WitnessConfig::default();
            for (k, v) in config("0").iter() {
                if k != key {
                    c.insert(k, v);
                }
            }
            let res = c.validate(PROGRAM, None, &mut Diagnostics::default());
            assert!(matches!(res, Err(Error::MalformedWitness(_))), "{key}");
        }
    }

    #[test]
    fn mandatory_keys_are_checked_before_witness_type() {
        let mut c = WitnessConfig::default();
        c.insert("witness-type", "correctness_witness");
        let res = c.validate(PROGRAM, None, &mut Diagnostics::default());
        assert!(matches!(res, Err(Error::MalformedWitness(_))));
    }

    #[test]
    fn unsupported_inputs() {
        let mut diag = Diagnostics::default();
        let mut c = config("0");
        c.insert("witness-type", "correctness_witness");
        assert!(matches!(
            c.validate(PROGRAM, None, &mut diag),
            Err(Error::UnsupportedInput(_))
        ));
        let mut c = config("0");
        c.insert("sourcecodelang", "Java");
        assert!(matches!(
            c.validate(PROGRAM, None, &mut diag),
            Err(Error::UnsupportedInput(_))
        ));
        assert!(matches!(
            config("0").validate(PROGRAM, Some(64), &mut diag),
            Err(Error::UnsupportedInput(_))
        ));
    }

    #[test]
    fn specification_shapes() {
        let e = parse_specification("CHECK( init(my_main()), LTL(G ! call(__VERIFIER_error())) )")
            .unwrap();
        assert_eq!(e.function, "my_main");
        assert!(matches!(
            parse_specification("CHECK( LTL(G valid-free) )"),
            Err(Error::MalformedWitness(_))
        ));
        let mut c = config(&sha1_of_program());
        c.insert("specification", "G true");
        assert!(matches!(
            c.validate(PROGRAM, None, &mut Diagnostics::default()),
            Err(Error::MalformedWitness(_))
        ));
    }
}
