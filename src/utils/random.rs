use rand::{distributions::Alphanumeric, Rng};

/// Random string of ASCII letters and digits.
pub fn random_alphanumeric(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}
