//! Contract interfaces the client talks to
//!
//! The traits are the seam between the managers and the chain: the RPC
//! provider binds them to `sol!` generated instances, tests bind them to
//! in-memory fakes.

mod bindings;

pub use bindings::{IUniswapV2Pair, IERC20};
pub(crate) use bindings::{IUniswapV2Factory, IUniswapV2Router02};

use crate::{Error, Result};
use alloy::primitives::{Address, TxHash, U256};
use async_trait::async_trait;
use futures::future::BoxFuture;

/// Allowance granted to the router when the current one is too small
///
/// This is the int256 maximum, the ceiling wallets commonly display as
/// "unlimited".
pub const MAX_ALLOWANCE: U256 = U256::from_limbs([u64::MAX, u64::MAX, u64::MAX, i64::MAX as u64]);

/// A submitted transaction that has not been confirmed yet
pub struct PendingTx {
    hash: TxHash,
    confirmation: BoxFuture<'static, Result<()>>,
}

impl PendingTx {
    pub fn new(hash: TxHash, confirmation: BoxFuture<'static, Result<()>>) -> Self {
        Self { hash, confirmation }
    }

    pub fn hash(&self) -> TxHash {
        self.hash
    }

    /// Wait until the transaction is mined successfully
    pub async fn confirmed(self) -> Result<TxHash> {
        self.confirmation.await?;
        Ok(self.hash)
    }
}

impl std::fmt::Debug for PendingTx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingTx")
            .field("hash", &self.hash)
            .finish_non_exhaustive()
    }
}

/// ERC20 token
#[async_trait]
pub trait Erc20: Send + Sync {
    async fn balance_of(&self, owner: Address) -> Result<U256>;

    async fn allowance(&self, owner: Address, spender: Address) -> Result<U256>;

    async fn approve(&self, spender: Address, amount: U256) -> Result<PendingTx>;
}

/// Uniswap V2 Router02
#[async_trait]
pub trait SwapRouter: Send + Sync {
    /// Wrapped native token the router swaps through
    async fn weth(&self) -> Result<Address>;

    async fn factory(&self) -> Result<Address>;

    /// Amounts along `path` for an exact input at current reserves
    async fn get_amounts_out(&self, amount_in: U256, path: Vec<Address>) -> Result<Vec<U256>>;

    async fn swap_exact_tokens_for_eth(
        &self,
        amount_in: U256,
        amount_out_min: U256,
        path: Vec<Address>,
        to: Address,
        deadline: U256,
    ) -> Result<PendingTx>;
}

/// Uniswap V2 Factory
#[async_trait]
pub trait PairFactory: Send + Sync {
    async fn get_pair(&self, token_a: Address, token_b: Address) -> Result<Address>;
}

/// Final output of a `getAmountsOut` result
pub fn amount_out(amounts: &[U256]) -> Result<U256> {
    amounts
        .last()
        .copied()
        .ok_or_else(|| Error::Contract("getAmountsOut returned no amounts".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::I256;
    use futures::FutureExt;

    #[test]
    fn test_max_allowance_is_int256_max() {
        assert_eq!(MAX_ALLOWANCE, I256::MAX.into_raw());
        assert!(MAX_ALLOWANCE < U256::MAX);
    }

    #[test]
    fn test_amount_out_takes_last() {
        let amounts = vec![U256::from(10), U256::from(3)];
        assert_eq!(amount_out(&amounts).unwrap(), U256::from(3));
        assert!(matches!(amount_out(&[]), Err(Error::Contract(_))));
    }

    #[tokio::test]
    async fn test_pending_tx_reports_failure() {
        let ok = PendingTx::new(TxHash::repeat_byte(1), async { Ok(()) }.boxed());
        assert_eq!(ok.confirmed().await.unwrap(), TxHash::repeat_byte(1));

        let failed = PendingTx::new(
            TxHash::repeat_byte(2),
            async { Err(Error::Transaction("reverted".to_string())) }.boxed(),
        );
        assert_eq!(failed.hash(), TxHash::repeat_byte(2));
        assert!(matches!(
            failed.confirmed().await,
            Err(Error::Transaction(_))
        ));
    }
}
