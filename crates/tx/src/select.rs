use bitcoin::Amount;
use satfund_primitives::utxo::UnspentOutput;

use crate::error::SelectionError;

/// Picks the shortest prefix of `utxos` worth at least `target + min_fee`.
///
/// Order is preserved, so callers control preference by sorting beforehand.
pub fn choose_inputs(
    utxos: &[UnspentOutput],
    target: Amount,
    min_fee: Amount,
) -> Result<Vec<UnspentOutput>, SelectionError> {
    let needed = target
        .checked_add(min_fee)
        .ok_or(SelectionError::AmountOverflow)?;

    let mut total = Amount::ZERO;
    let mut count = 0;
    while total < needed {
        let Some(utxo) = utxos.get(count) else {
            return Err(SelectionError::InsufficientFunds {
                needed,
                available: total,
            });
        };
        total = total
            .checked_add(utxo.value)
            .ok_or(SelectionError::AmountOverflow)?;
        count += 1;
    }

    Ok(utxos[..count].to_vec())
}
