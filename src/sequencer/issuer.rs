/// Sending side of one scope. Sequence numbers start at 0 and are handed out exactly once.
#[derive(Debug, Default)]
pub struct SequenceIssuer {
    next: u64,
}

impl SequenceIssuer {
    pub fn new() -> Self {
        SequenceIssuer::default()
    }

    pub fn next_sequence(&mut self) -> u64 {
        let sequence = self.next;
        self.next += 1;
        sequence
    }

    pub fn issued(&self) -> u64 {
        self.next
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strictly_increasing_from_zero() {
        let mut issuer = SequenceIssuer::new();
        assert_eq!(issuer.next_sequence(), 0);
        assert_eq!(issuer.next_sequence(), 1);
        assert_eq!(issuer.next_sequence(), 2);
        assert_eq!(issuer.issued(), 3);
    }
}
