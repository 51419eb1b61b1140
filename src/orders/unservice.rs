//! Unservice line-item synthesis.
//!
//! When a technician cannot perform the service, the order keeps its original
//! lines and gains mirrored negative-quantity deduction lines that zero them
//! out, plus exactly one car-fare line. Applying the flow twice must not
//! duplicate deduction lines.

use rust_decimal::Decimal;

use crate::orders::models::{CarFare, ServiceItem};

/// Prefix marking a synthesized deduction line.
pub const DEDUCTION_PREFIX: &str = "減項：";

/// Prefix marking a car-fare line.
pub const FARE_PREFIX: &str = "車馬費";

pub fn is_deduction_line(item: &ServiceItem) -> bool {
    item.name.starts_with(DEDUCTION_PREFIX)
}

pub fn is_fare_line(item: &ServiceItem) -> bool {
    item.name.starts_with(FARE_PREFIX)
}

/// True when deduction lines were already synthesized for this order.
pub fn has_deduction_lines(items: &[ServiceItem]) -> bool {
    items.iter().any(is_deduction_line)
}

/// Produce the full post-unservice item list: originals, mirrored deductions
/// (skipped when they already exist), and one fare line.
pub fn apply_unservice(items: &[ServiceItem], fare: CarFare) -> Vec<ServiceItem> {
    let mut result: Vec<ServiceItem> = items.to_vec();

    if !has_deduction_lines(items) {
        let deductions: Vec<ServiceItem> = items
            .iter()
            .filter(|i| i.quantity > 0 && !is_fare_line(i))
            .map(|i| ServiceItem {
                name: format!("{}{}", DEDUCTION_PREFIX, i.name),
                quantity: -i.quantity,
                unit_price: i.unit_price,
                product_id: None,
            })
            .collect();
        result.extend(deductions);
    }

    let fare_line = match fare {
        CarFare::Fare400 => ServiceItem {
            name: "車馬費$400".to_string(),
            quantity: 1,
            unit_price: Decimal::from(400),
            product_id: None,
        },
        CarFare::None => ServiceItem {
            name: "車馬費$0".to_string(),
            quantity: 1,
            unit_price: Decimal::ZERO,
            product_id: None,
        },
    };
    result.push(fare_line);

    result
}

/// Append the unservice marker to the order note.
pub fn append_unservice_note(note: &str, reason: &str) -> String {
    let marker = format!("[無法服務] {}", reason);
    if note.trim().is_empty() {
        marker
    } else {
        format!("{}\n{}", note, marker)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn item(name: &str, quantity: i32, unit_price: Decimal) -> ServiceItem {
        ServiceItem {
            name: name.to_string(),
            quantity,
            unit_price,
            product_id: None,
        }
    }

    #[test]
    fn test_deductions_mirror_positive_lines() {
        let items = vec![
            item("冷氣清洗", 2, dec!(1500)),
            item("濾網更換", 1, dec!(250)),
        ];
        let result = apply_unservice(&items, CarFare::None);

        let deductions: Vec<_> = result.iter().filter(|i| is_deduction_line(i)).collect();
        assert_eq!(deductions.len(), 2);
        assert_eq!(deductions[0].name, "減項：冷氣清洗");
        assert_eq!(deductions[0].quantity, -2);
        assert_eq!(deductions[0].unit_price, dec!(1500));

        // Originals plus deductions net to zero; only the fare line remains.
        let total: Decimal = result.iter().map(|i| i.subtotal()).sum();
        assert_eq!(total, dec!(0));
    }

    #[test]
    fn test_fare_400_line() {
        let items = vec![item("冷氣清洗", 1, dec!(2000))];
        let result = apply_unservice(&items, CarFare::Fare400);
        let fare: Vec<_> = result.iter().filter(|i| is_fare_line(i)).collect();
        assert_eq!(fare.len(), 1);
        assert_eq!(fare[0].name, "車馬費$400");
        assert_eq!(fare[0].quantity, 1);
        assert_eq!(fare[0].unit_price, dec!(400));

        let total: Decimal = result.iter().map(|i| i.subtotal()).sum();
        assert_eq!(total, dec!(400));
    }

    #[test]
    fn test_idempotent_deduction_synthesis() {
        let items = vec![item("冷氣清洗", 1, dec!(2000))];
        let once = apply_unservice(&items, CarFare::Fare400);
        let twice = apply_unservice(&once, CarFare::Fare400);

        let first_count = once.iter().filter(|i| is_deduction_line(i)).count();
        let second_count = twice.iter().filter(|i| is_deduction_line(i)).count();
        assert_eq!(first_count, 1);
        assert_eq!(second_count, 1, "second application must not add 減項 lines");
    }

    #[test]
    fn test_negative_and_fare_lines_not_mirrored() {
        let items = vec![
            item("冷氣清洗", 1, dec!(2000)),
            item("減項：舊折讓", -1, dec!(100)),
            item("車馬費$400", 1, dec!(400)),
        ];
        // A pre-existing 減項 line means synthesis is skipped entirely.
        let result = apply_unservice(&items, CarFare::None);
        let deductions = result.iter().filter(|i| is_deduction_line(i)).count();
        assert_eq!(deductions, 1);
    }

    #[test]
    fn test_note_append() {
        assert_eq!(append_unservice_note("", "機型不符"), "[無法服務] 機型不符");
        assert_eq!(
            append_unservice_note("原始備註", "機型不符"),
            "原始備註\n[無法服務] 機型不符"
        );
    }
}
