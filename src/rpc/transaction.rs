use crate::xdr::{
    DiagnosticEvent, Limits, OperationBody, ReadXdr, SorobanAuthorizationEntry,
    SorobanTransactionData, Transaction, TransactionExt, VecM,
};

use crate::rpc::{Error, SimulateTransactionResponse};

/// Fee charged per operation before resource fees.
pub const BASE_FEE: u32 = 100;

// Apply the result of a simulateTransaction onto a transaction envelope, preparing it for
// submission to the network.
pub fn assemble(
    raw: &Transaction,
    simulation: &SimulateTransactionResponse,
) -> Result<Transaction, Error> {
    let mut tx = raw.clone();

    // simulate.results is one-result-per-function and only a single operation is supported.
    if tx.operations.len() != 1 {
        return Err(Error::UnexpectedOperationCount {
            count: tx.operations.len(),
        });
    }

    let events = simulation
        .events
        .iter()
        .map(|e| DiagnosticEvent::from_xdr_base64(e, Limits::none()))
        .collect::<Result<Vec<_>, _>>()?;
    if !events.is_empty() {
        tracing::debug!(simulation_events=?events);
    }

    // update the fees of the actual transaction to meet the minimum resource fees.
    let min_fee = BASE_FEE.saturating_add(simulation.min_resource_fee);
    let fee = tx.fee.max(min_fee);

    let transaction_data =
        SorobanTransactionData::from_xdr_base64(&simulation.transaction_data, Limits::none())?;

    let mut op = tx.operations[0].clone();
    match &mut op.body {
        OperationBody::InvokeHostFunction(ref mut body) => {
            if simulation.results.len() != 1 {
                return Err(Error::UnexpectedSimulateTransactionResultSize {
                    length: simulation.results.len(),
                });
            }
            let auths: VecM<SorobanAuthorizationEntry> = simulation.results[0]
                .auth
                .iter()
                .map(|a| SorobanAuthorizationEntry::from_xdr_base64(a, Limits::none()))
                .collect::<Result<Vec<_>, _>>()?
                .try_into()?;
            if !auths.is_empty() {
                body.auth = auths;
            }
        }
        _ => return Err(Error::UnsupportedOperationType),
    }

    tx.fee = fee;
    tx.operations = vec![op].try_into()?;
    tx.ext = TransactionExt::V1(transaction_data);
    Ok(tx)
}
