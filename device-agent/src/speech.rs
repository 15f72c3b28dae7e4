//! Indonesian rendering of payment amounts for the spoken announcement.
//!
//! Construction rules: whole millions and whole thousands are rendered in
//! words ("satu juta", "sepuluh ribu"); a sub-thousand remainder after a
//! thousands clause is appended as the literal digit sequence; amounts under
//! a thousand are spoken as digits. Zero remainders produce no clause.

const UNITS: [&str; 10] = [
    "", "satu", "dua", "tiga", "empat", "lima", "enam", "tujuh", "delapan", "sembilan",
];

/// Words for 1..=999. Indonesian uses the "se-" prefix for a leading one:
/// sepuluh, sebelas, seratus.
fn small_words(n: i64) -> String {
    debug_assert!((1..=999).contains(&n));
    match n {
        1..=9 => UNITS[n as usize].to_string(),
        10 => "sepuluh".to_string(),
        11 => "sebelas".to_string(),
        12..=19 => format!("{} belas", UNITS[(n - 10) as usize]),
        20..=99 => {
            let tens = format!("{} puluh", UNITS[(n / 10) as usize]);
            if n % 10 == 0 {
                tens
            } else {
                format!("{tens} {}", UNITS[(n % 10) as usize])
            }
        }
        100..=199 => {
            if n == 100 {
                "seratus".to_string()
            } else {
                format!("seratus {}", small_words(n - 100))
            }
        }
        _ => {
            let hundreds = format!("{} ratus", UNITS[(n / 100) as usize]);
            if n % 100 == 0 {
                hundreds
            } else {
                format!("{hundreds} {}", small_words(n % 100))
            }
        }
    }
}

pub fn amount_in_words(amount: i64) -> String {
    if amount >= 1_000_000 {
        let millions = amount / 1_000_000;
        let remainder = amount % 1_000_000;
        // small_words only covers 1..=999; larger multipliers recurse.
        let clause = if millions == 1 {
            "satu juta".to_string()
        } else if millions <= 999 {
            format!("{} juta", small_words(millions))
        } else {
            format!("{} juta", amount_in_words(millions))
        };
        if remainder == 0 {
            clause
        } else {
            format!("{clause} {}", amount_in_words(remainder))
        }
    } else if amount >= 1_000 {
        let thousands = amount / 1_000;
        let remainder = amount % 1_000;
        let clause = if thousands == 1 {
            "seribu".to_string()
        } else {
            format!("{} ribu", small_words(thousands))
        };
        if remainder == 0 {
            clause
        } else {
            format!("{clause} {remainder}")
        }
    } else {
        amount.to_string()
    }
}

/// The full spoken phrase for a settled payment.
pub fn announcement_phrase(amount: i64) -> String {
    format!(
        "Pembayaran {} rupiah, berhasil diterima",
        amount_in_words(amount)
    )
}

/// Rupiah formatting for the silent status notification: dot thousands
/// separator, no fraction digits.
pub fn format_rupiah(amount: i64) -> String {
    let digits = amount.abs().to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push('.');
        }
        out.push(ch);
    }
    if amount < 0 {
        format!("-{out}")
    } else {
        out
    }
}
