use rust_decimal::Decimal;

/// Net amount for a trip income entry.
///
/// Revenue is the onward and return fares for the day; the number of trips
/// is recorded as metadata and does not multiply the revenue.
pub fn trip_amount(
    onward_amount: Decimal,
    return_amount: Decimal,
    driver_salary: Decimal,
    conductor_salary: Decimal,
    other_expense: Decimal,
) -> Decimal {
    (onward_amount + return_amount) - (driver_salary + conductor_salary + other_expense)
}

/// Net amount for a hire (charter) income entry.
pub fn hire_amount(
    hire_amount: Decimal,
    driver_salary: Decimal,
    conductor_salary: Decimal,
    other_expense: Decimal,
) -> Decimal {
    hire_amount - (driver_salary + conductor_salary + other_expense)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    fn dec(n: i64) -> Decimal {
        Decimal::from(n)
    }

    #[test]
    fn trip_amount_nets_salaries_and_expense() {
        let amount = trip_amount(dec(3000), dec(2500), dec(250), dec(150), dec(200));
        assert_eq!(amount, dec(4900));
    }

    #[test]
    fn trip_amount_ignores_number_of_trips() {
        // The same fares yield the same net whether the bus made one run or
        // three; trips-per-day is informational only.
        let single = trip_amount(dec(1000), dec(1000), dec(100), dec(100), dec(0));
        assert_eq!(single, dec(1800));
    }

    #[test]
    fn trip_amount_can_be_negative() {
        let amount = trip_amount(dec(100), dec(100), dec(250), dec(150), dec(0));
        assert_eq!(amount, dec(-200));
    }

    #[test]
    fn hire_amount_nets_salaries_and_expense() {
        let amount = hire_amount(dec(8000), dec(1500), dec(1000), dec(500));
        assert_eq!(amount, dec(5000));
    }

    #[test]
    fn hire_amount_with_zero_other_expense() {
        let amount = hire_amount(dec(8000), dec(1500), dec(1000), dec(0));
        assert_eq!(amount, dec(5500));
    }
}
