use crate::models::{NetDirection, Position, SymbolSummary};
use rust_decimal::Decimal;
use std::collections::BTreeMap;

/// Aggregate the open position set into one summary per traded symbol.
///
/// Pure and total: no I/O, identical output for identical input, empty
/// input produces empty output. BUY volume counts positive, SELL volume
/// negative; the reported `net_volume` is the absolute value of that sum
/// and `net_type` carries its sign (NEUTRAL on an exact zero). Output is
/// sorted by symbol.
pub fn symbol_summaries(positions: &[Position]) -> Vec<SymbolSummary> {
    #[derive(Default)]
    struct Acc {
        signed_volume: Decimal,
        profit: Decimal,
        swap: Decimal,
        commission: Decimal,
        count: usize,
    }

    let mut by_symbol: BTreeMap<&str, Acc> = BTreeMap::new();

    for pos in positions {
        let acc = by_symbol.entry(pos.symbol.as_str()).or_default();
        acc.signed_volume += pos.signed_volume();
        acc.profit += pos.profit;
        acc.swap += pos.swap;
        acc.commission += pos.commission;
        acc.count += 1;
    }

    by_symbol
        .into_iter()
        .map(|(symbol, acc)| {
            let net_type = if acc.signed_volume > Decimal::ZERO {
                NetDirection::Buy
            } else if acc.signed_volume < Decimal::ZERO {
                NetDirection::Sell
            } else {
                NetDirection::Neutral
            };
            SymbolSummary {
                symbol: symbol.to_string(),
                net_volume: acc.signed_volume.abs(),
                net_type,
                total_profit: acc.profit,
                total_swap: acc.swap,
                total_commission: acc.commission,
                position_count: acc.count,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Side;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn position(symbol: &str, side: Side, volume: Decimal, profit: Decimal) -> Position {
        Position {
            ticket: 1,
            symbol: symbol.to_string(),
            side,
            volume,
            open_price: dec!(1.0),
            current_price: dec!(1.0),
            profit,
            swap: dec!(-0.5),
            commission: dec!(-1),
            open_time: Utc::now(),
            stop_loss: None,
            take_profit: None,
            comment: None,
        }
    }

    #[test]
    fn test_empty_positions_empty_summaries() {
        assert!(symbol_summaries(&[]).is_empty());
    }

    #[test]
    fn test_single_buy_position() {
        let positions = vec![position("XAUUSD", Side::Buy, dec!(0.10), dec!(32.50))];
        let summaries = symbol_summaries(&positions);

        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].symbol, "XAUUSD");
        assert_eq!(summaries[0].net_volume, dec!(0.10));
        assert_eq!(summaries[0].net_type, NetDirection::Buy);
        assert_eq!(summaries[0].total_profit, dec!(32.50));
        assert_eq!(summaries[0].position_count, 1);
    }

    #[test]
    fn test_offsetting_positions_are_neutral() {
        let positions = vec![
            position("EURUSD", Side::Buy, dec!(0.50), dec!(10)),
            position("EURUSD", Side::Sell, dec!(0.50), dec!(-4)),
        ];
        let summaries = symbol_summaries(&positions);

        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].net_volume, dec!(0.00));
        assert_eq!(summaries[0].net_type, NetDirection::Neutral);
        assert_eq!(summaries[0].total_profit, dec!(6));
        assert_eq!(summaries[0].position_count, 2);
    }

    #[test]
    fn test_net_short_when_sells_dominate() {
        let positions = vec![
            position("EURUSD", Side::Buy, dec!(0.30), dec!(5)),
            position("EURUSD", Side::Sell, dec!(0.80), dec!(7)),
        ];
        let summaries = symbol_summaries(&positions);

        assert_eq!(summaries[0].net_volume, dec!(0.50));
        assert_eq!(summaries[0].net_type, NetDirection::Sell);
    }

    #[test]
    fn test_one_summary_per_distinct_symbol() {
        let positions = vec![
            position("XAUUSD", Side::Buy, dec!(0.10), dec!(1)),
            position("EURUSD", Side::Sell, dec!(0.50), dec!(2)),
            position("XAUUSD", Side::Buy, dec!(0.20), dec!(3)),
        ];
        let summaries = symbol_summaries(&positions);

        let symbols: Vec<&str> = summaries.iter().map(|s| s.symbol.as_str()).collect();
        assert_eq!(symbols, vec!["EURUSD", "XAUUSD"]);

        let gold = &summaries[1];
        assert_eq!(gold.net_volume, dec!(0.30));
        assert_eq!(gold.net_type, NetDirection::Buy);
        assert_eq!(gold.total_profit, dec!(4));
        assert_eq!(gold.position_count, 2);
    }

    #[test]
    fn test_swap_and_commission_totals() {
        let positions = vec![
            position("GBPUSD", Side::Buy, dec!(0.10), dec!(1)),
            position("GBPUSD", Side::Sell, dec!(0.10), dec!(1)),
        ];
        let summaries = symbol_summaries(&positions);

        assert_eq!(summaries[0].total_swap, dec!(-1.0));
        assert_eq!(summaries[0].total_commission, dec!(-2));
    }

    #[test]
    fn test_idempotent_on_unchanged_input() {
        let positions = vec![
            position("XAUUSD", Side::Buy, dec!(0.10), dec!(1)),
            position("EURUSD", Side::Sell, dec!(0.80), dec!(2)),
        ];
        assert_eq!(symbol_summaries(&positions), symbol_summaries(&positions));
    }
}
