// utils/currency.rs
// Amounts are stored as i64 centavos end to end; pesos only appear at the
// API edges.

pub fn centavos_to_pesos(centavos: i64) -> f64 {
    centavos as f64 / 100.0
}

pub fn generate_payment_reference() -> String {
    format!(
        "LBR_{}",
        uuid::Uuid::new_v4()
            .to_string()
            .replace("-", "")
            .to_uppercase()[..16]
            .to_string()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converts_centavos_to_pesos() {
        assert_eq!(centavos_to_pesos(1_000_000), 10_000.0);
        assert_eq!(centavos_to_pesos(1), 0.01);
    }

    #[test]
    fn reference_has_prefix_and_length() {
        let r = generate_payment_reference();
        assert!(r.starts_with("LBR_"));
        assert_eq!(r.len(), 20);
    }
}
