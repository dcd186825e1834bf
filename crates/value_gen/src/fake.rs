//! Fake data kinds backed by the `fake` crate.
//!
//! Provides deterministic names, emails, addresses and lorem text
//! when driven by a seeded RNG.

use fake::faker::address::en::{CityName, StreetName, ZipCode};
use fake::faker::company::en::CompanyName;
use fake::faker::internet::en::{SafeEmail, Username};
use fake::faker::lorem::en::{Paragraph, Sentence, Word};
use fake::faker::name::en::{FirstName, LastName, Name};
use fake::faker::phone_number::en::PhoneNumber;
use fake::Fake;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

/// Kind of fake value to produce
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", try_from = "String")]
pub enum FakeKind {
    Name,
    FirstName,
    LastName,
    Email,
    Username,
    Phone,
    Company,
    City,
    Street,
    Zip,
    Word,
    Sentence,
    Paragraph,
}

impl FakeKind {
    pub fn generate(&self, rng: &mut ChaCha8Rng) -> String {
        match self {
            FakeKind::Name => Name().fake_with_rng(rng),
            FakeKind::FirstName => FirstName().fake_with_rng(rng),
            FakeKind::LastName => LastName().fake_with_rng(rng),
            FakeKind::Email => SafeEmail().fake_with_rng(rng),
            FakeKind::Username => Username().fake_with_rng(rng),
            FakeKind::Phone => PhoneNumber().fake_with_rng(rng),
            FakeKind::Company => CompanyName().fake_with_rng(rng),
            FakeKind::City => CityName().fake_with_rng(rng),
            FakeKind::Street => StreetName().fake_with_rng(rng),
            FakeKind::Zip => ZipCode().fake_with_rng(rng),
            FakeKind::Word => Word().fake_with_rng(rng),
            FakeKind::Sentence => Sentence(3..10).fake_with_rng(rng),
            FakeKind::Paragraph => Paragraph(2..4).fake_with_rng(rng),
        }
    }
}

impl std::str::FromStr for FakeKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "name" | "full_name" => Ok(FakeKind::Name),
            "first_name" => Ok(FakeKind::FirstName),
            "last_name" => Ok(FakeKind::LastName),
            "email" | "safe_email" => Ok(FakeKind::Email),
            "username" | "user_name" => Ok(FakeKind::Username),
            "phone" | "phone_number" => Ok(FakeKind::Phone),
            "company" | "company_name" => Ok(FakeKind::Company),
            "city" => Ok(FakeKind::City),
            "street" | "street_name" => Ok(FakeKind::Street),
            "zip" | "zip_code" | "postal_code" => Ok(FakeKind::Zip),
            "word" => Ok(FakeKind::Word),
            "sentence" => Ok(FakeKind::Sentence),
            "paragraph" => Ok(FakeKind::Paragraph),
            _ => Err(format!(
                "Unknown fake kind: {}. Use name, first_name, last_name, email, username, phone, company, city, street, zip, word, sentence or paragraph",
                s
            )),
        }
    }
}

impl TryFrom<String> for FakeKind {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}
