//! Glin quote parsing and message formatting
//!
//! Turns a payment-terms response into the Pix / card / installments
//! figures and renders the two Portuguese messages sent to customers.

use tracing::info;

use super::types::{GlinQuote, Installment, PaymentTerms};

/// Format a float as Brazilian currency: `R$ 1.234,56`
pub fn format_brl(value: f64) -> String {
    let formatted = format!("{:.2}", value.abs());
    let (int_part, frac_part) = formatted.split_once('.').unwrap_or((&formatted, "00"));

    let mut grouped = String::new();
    for (i, c) in int_part.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            grouped.push('.');
        }
        grouped.push(c);
    }
    let grouped: String = grouped.chars().rev().collect();

    let sign = if value < 0.0 { "-" } else { "" };
    format!("{}R$ {},{}", sign, grouped, frac_part)
}

/// Convert a payment-terms response into the quote figures. Options
/// with missing amounts are skipped; installments come out sorted.
pub fn parse_payment_terms(terms: &PaymentTerms) -> GlinQuote {
    let mut pix = "N/A".to_string();
    let mut card_1x = "N/A".to_string();
    let mut installments: Vec<Installment> = Vec::new();

    for option in &terms.options {
        match option.method.as_str() {
            "pix" => {
                if let Some(total) = option.total_due_amount {
                    pix = format_brl(total);
                }
            }
            "card" => {
                for plan in &option.installment_plans {
                    let Some(inst_amount) = plan.installment_amount else {
                        continue;
                    };

                    let value = format!("{}x {}", plan.installments, format_brl(inst_amount));
                    let total = plan
                        .total_amount
                        .map(|t| format!("Total: {}", format_brl(t)))
                        .unwrap_or_default();

                    installments.push(Installment {
                        n: plan.installments,
                        value,
                        total,
                    });

                    if plan.installments == 1 {
                        card_1x = format_brl(inst_amount);
                    }
                }
            }
            _ => {}
        }
    }

    installments.sort_by_key(|i| i.n);
    info!(
        "Quote parsed - Pix: {} | 1x card: {} | {} installment plans",
        pix,
        card_1x,
        installments.len()
    );

    GlinQuote {
        pix,
        card_1x,
        installments,
        payment_link: None,
    }
}

/// Render the customer-facing quote message
pub fn format_glin_message(quote_usd: f64, quote: &GlinQuote, size: &str) -> String {
    // Plans above 12x exist in the API response but are not offered
    let installments_block: String = quote
        .installments
        .iter()
        .filter(|i| i.n <= 12)
        .map(|i| format!("{}\n{}\n", i.value, i.total))
        .collect();

    format!(
        "\u{1F4B2}   {quote}      Enviado no size: {size}\n\
         \n\
         \u{1F4B8} Pix-\n\
         \n\
         \n\
         {pix}\n\
         \n\
         \u{1F4B3} Cartão-\n\
         \n\
         \n\
         {card}\n\
         \n\
         {installments}\n\
         \u{1F911} Pagamento: Pix, Boleto e Cartão em 12x com juros, clientes NU podem parcelar em até 24x. Também trabalhamos com Wise.\n\
         \n\
         \u{2708}\u{FE0F} *Prazo de entrega* - 30 dias úteis em média\n\
         \u{1F6C3} Taxa Alfandegária não inclusa.",
        quote = quote_usd as i64,
        size = size,
        pix = quote.pix,
        card = quote.card_1x.trim(),
        installments = installments_block,
    )
}

/// Render the payment-link message with the purchase terms
pub fn format_payment_link_message(link: &str) -> String {
    format!(
        "\u{1F447}\u{1F3FB}*Link de Pagamento*\u{1F447}\u{1F3FB}\n\
         \n\
         \n\
         {link}\n\
         \n\
         \u{1F4A5}Ao finalizar a compra, você concorda automaticamente com os Termos de Uso da TeuCool (disponíveis no app).\n\
         \n\
         \u{1F4B2} Formas de pagamento:\n\
         • Pix\n\
         • Boleto\n\
         • Cartão (em até 12x com juros)\n\
         • Wise\n\
         \n\
         \u{26A0}\u{FE0F} Importante: devido à variação cambial, o pagamento deve ser realizado em até 1 hora após a geração do link.\n\
         \n\
         \u{203C}\u{FE0F} *Atenção* às regras da compra:\n\
         • *Compras realizadas via StockX, GOAT e plataformas similares são finais, sem possibilidade de cancelamento ou arrependimento após a confirmação*.\n\
         • Caso a plataforma de compra possua política de devolução (ex: Amazon), eventual valor reembolsado pelo vendedor *será convertido em crédito no app TeuCool, não havendo estorno em dinheiro*.\n\
         • *Após a confirmação do pagamento e da compra, não realizamos estorno por desistência, arrependimento ou mudança de decisão.*\n\
         \n\
         \n\
         Ao prosseguir com o pagamento, você declara estar ciente e de acordo com essas condições.",
        link = link,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn brl_formatting_uses_brazilian_separators() {
        assert_eq!(format_brl(10542.37), "R$ 10.542,37");
        assert_eq!(format_brl(0.5), "R$ 0,50");
        assert_eq!(format_brl(1234567.89), "R$ 1.234.567,89");
    }

    #[test]
    fn terms_parsing_extracts_pix_and_card() {
        let terms: PaymentTerms = serde_json::from_str(
            r#"{
                "options": [
                    {"method": "pix", "totalDueAmount": 10542.37},
                    {"method": "card", "installmentPlans": [
                        {"installments": 3, "installmentAmount": 3700.10, "totalAmount": 11100.30},
                        {"installments": 1, "installmentAmount": 10887.21, "totalAmount": 10887.21},
                        {"installments": 2, "installmentAmount": 5500.00}
                    ]}
                ]
            }"#,
        )
        .unwrap();

        let quote = parse_payment_terms(&terms);
        assert_eq!(quote.pix, "R$ 10.542,37");
        assert_eq!(quote.card_1x, "R$ 10.887,21");

        // Sorted by installment count, missing totals tolerated
        let counts: Vec<u32> = quote.installments.iter().map(|i| i.n).collect();
        assert_eq!(counts, vec![1, 2, 3]);
        assert_eq!(quote.installments[1].total, "");
    }

    #[test]
    fn terms_without_options_yield_placeholders() {
        let quote = parse_payment_terms(&PaymentTerms::default());
        assert_eq!(quote.pix, "N/A");
        assert_eq!(quote.card_1x, "N/A");
        assert!(quote.installments.is_empty());
    }

    #[test]
    fn plans_with_missing_amounts_are_skipped() {
        let terms: PaymentTerms = serde_json::from_str(
            r#"{"options": [{"method": "card", "installmentPlans": [{"installments": 5}]}]}"#,
        )
        .unwrap();
        assert!(parse_payment_terms(&terms).installments.is_empty());
    }

    #[test]
    fn quote_message_carries_figures_and_size() {
        let quote = GlinQuote {
            pix: "R$ 1.000,00".into(),
            card_1x: "R$ 1.050,00".into(),
            installments: vec![
                Installment {
                    n: 1,
                    value: "1x R$ 1.050,00".into(),
                    total: "Total: R$ 1.050,00".into(),
                },
                Installment {
                    n: 18,
                    value: "18x R$ 70,00".into(),
                    total: "Total: R$ 1.260,00".into(),
                },
            ],
            payment_link: None,
        };

        let message = format_glin_message(271.0, &quote, "9.5");
        assert!(message.contains("271"));
        assert!(message.contains("Enviado no size: 9.5"));
        assert!(message.contains("R$ 1.000,00"));
        assert!(message.contains("1x R$ 1.050,00"));
        // Plans above 12x are filtered out of the message
        assert!(!message.contains("18x"));
    }

    #[test]
    fn link_message_embeds_the_link() {
        let message = format_payment_link_message("https://glinpay.me/shop/abc/USD271.04");
        assert!(message.contains("https://glinpay.me/shop/abc/USD271.04"));
        assert!(message.contains("Link de Pagamento"));
    }
}
