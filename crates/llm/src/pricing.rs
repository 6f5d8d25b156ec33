//! Cost computation from a configured per-model price table. The price
//! table itself is config, not code (see `config::Options::llm_prices`);
//! this module only turns a price + token counts into a dollar amount.

use config::ModelPrice;

#[must_use]
pub fn cost_usd(price: &ModelPrice, input_tokens: u32, output_tokens: u32) -> f64 {
    let input_cost = (f64::from(input_tokens) / 1_000_000.0) * price.input_per_million;
    let output_cost = (f64::from(output_tokens) / 1_000_000.0) * price.output_per_million;
    input_cost + output_cost
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn computes_blended_cost() {
        let price = ModelPrice {
            input_per_million: 3.0,
            output_per_million: 15.0,
        };
        let cost = cost_usd(&price, 1_000_000, 500_000);
        assert!((cost - 10.5).abs() < 1e-9);
    }
}
