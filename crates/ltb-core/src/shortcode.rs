use std::iter;

const ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

/// Source of candidate short codes. Uniqueness is checked by the caller.
pub trait CodeGenerator: Send + Sync {
    fn generate(&self) -> String;
}

/// Random `[a-z0-9]` codes of a fixed length.
#[derive(Clone, Copy, Debug)]
pub struct RandomCodeGenerator {
    length: usize,
}

impl RandomCodeGenerator {
    pub fn new(length: usize) -> Self {
        Self {
            length: length.max(1),
        }
    }
}

impl CodeGenerator for RandomCodeGenerator {
    fn generate(&self) -> String {
        iter::repeat_with(|| ALPHABET[rand::random_range(0..ALPHABET.len())] as char)
            .take(self.length)
            .collect()
    }
}

/// Whether `s` looks like a code produced by a [`CodeGenerator`].
pub fn is_valid_code(s: &str) -> bool {
    (1..=64).contains(&s.len()) && s.bytes().all(|b| ALPHABET.contains(&b))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn random_codes_have_requested_length_and_alphabet() {
        let g = RandomCodeGenerator::new(6);
        for _ in 0..50 {
            let code = g.generate();
            assert_eq!(code.len(), 6);
            assert!(is_valid_code(&code), "bad code {code}");
        }
    }

    #[test]
    fn validation_rejects_foreign_characters() {
        assert!(is_valid_code("abc123"));
        assert!(!is_valid_code(""));
        assert!(!is_valid_code("ABC123"));
        assert!(!is_valid_code("abc-12"));
    }
}
