use crate::contractspec::TypeDef;

use super::{MethodDescriptor, MethodInput};

fn method(
    name: &str,
    docs: &str,
    inputs: &[(&str, TypeDef)],
    output: Option<TypeDef>,
) -> MethodDescriptor {
    MethodDescriptor {
        name: name.to_string(),
        docs: Some(docs.to_string()),
        inputs: inputs
            .iter()
            .map(|(name, type_)| MethodInput {
                name: (*name).to_string(),
                type_: type_.clone(),
            })
            .collect(),
        outputs: output.into_iter().collect(),
    }
}

/// The Stellar Asset Contract interface. Every asset contract exposes exactly
/// these functions, so they are never read from a module.
pub fn methods() -> Vec<MethodDescriptor> {
    vec![
        method(
            "allowance",
            "Returns the allowance for `spender` to transfer from `from`.",
            &[("from", TypeDef::Address), ("spender", TypeDef::Address)],
            Some(TypeDef::I128),
        ),
        method(
            "approve",
            "Set the allowance by `amount` for `spender` to transfer/burn from `from`. The allowance expires at `expiration_ledger`.",
            &[
                ("from", TypeDef::Address),
                ("spender", TypeDef::Address),
                ("amount", TypeDef::I128),
                ("expiration_ledger", TypeDef::U32),
            ],
            None,
        ),
        method(
            "balance",
            "Returns the balance of `id`.",
            &[("id", TypeDef::Address)],
            Some(TypeDef::I128),
        ),
        method(
            "transfer",
            "Transfer `amount` from `from` to `to`.",
            &[
                ("from", TypeDef::Address),
                ("to", TypeDef::Address),
                ("amount", TypeDef::I128),
            ],
            None,
        ),
        method(
            "transfer_from",
            "Transfer `amount` from `from` to `to`, consuming the allowance of `spender`.",
            &[
                ("spender", TypeDef::Address),
                ("from", TypeDef::Address),
                ("to", TypeDef::Address),
                ("amount", TypeDef::I128),
            ],
            None,
        ),
        method(
            "burn",
            "Burn `amount` from `from`.",
            &[("from", TypeDef::Address), ("amount", TypeDef::I128)],
            None,
        ),
        method(
            "burn_from",
            "Burn `amount` from `from`, consuming the allowance of `spender`.",
            &[
                ("spender", TypeDef::Address),
                ("from", TypeDef::Address),
                ("amount", TypeDef::I128),
            ],
            None,
        ),
        method(
            "decimals",
            "Returns the number of decimals used to represent amounts of this token.",
            &[],
            Some(TypeDef::U32),
        ),
        method(
            "name",
            "Returns the name for this token.",
            &[],
            Some(TypeDef::String),
        ),
        method(
            "symbol",
            "Returns the symbol for this token.",
            &[],
            Some(TypeDef::String),
        ),
        method(
            "set_admin",
            "Sets the administrator to the specified address `new_admin`.",
            &[("new_admin", TypeDef::Address)],
            None,
        ),
        method(
            "admin",
            "Returns the admin of the contract.",
            &[],
            Some(TypeDef::Address),
        ),
        method(
            "set_authorized",
            "Sets whether the account is authorized to use its balance.",
            &[("id", TypeDef::Address), ("authorize", TypeDef::Bool)],
            None,
        ),
        method(
            "authorized",
            "Returns true if `id` is authorized to use its balance.",
            &[("id", TypeDef::Address)],
            Some(TypeDef::Bool),
        ),
        method(
            "mint",
            "Mints `amount` to `to`.",
            &[("to", TypeDef::Address), ("amount", TypeDef::I128)],
            None,
        ),
        method(
            "clawback",
            "Clawback `amount` from `from` account. `amount` is burned.",
            &[("from", TypeDef::Address), ("amount", TypeDef::I128)],
            None,
        ),
    ]
}
