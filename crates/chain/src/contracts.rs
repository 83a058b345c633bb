//! Contract bindings for the Aave-v2-style lending protocol and the
//! on-chain liquidator wrapper (§6 of the spec).
//!
//! Typed ABI definitions via Alloy's `sol!` macro, matching the upstream
//! collaborator signatures verbatim: `LendingPool`, `ProtocolDataProvider`,
//! `PriceOracle`, and `LiquidatorForAave`.

use alloy::primitives::{Address, Bytes, U256};
use alloy::sol;
use alloy::sol_types::SolCall;

sol! {
    /// Aave-v2-style lending pool (subset needed by the Account Oracle).
    #[sol(rpc)]
    pub interface ILendingPool {
        function getUserAccountData(address user) external view returns (
            uint256 totalCollateralETH,
            uint256 totalDebtETH,
            uint256 availableBorrowsETH,
            uint256 currentLiquidationThreshold,
            uint256 ltv,
            uint256 healthFactor
        );

        function getReserveNormalizedVariableDebt(address asset) external view returns (uint256);
    }

    /// Protocol data provider (reserve enumeration/configuration/balances).
    #[sol(rpc)]
    pub interface IProtocolDataProvider {
        function getAllReservesTokens() external view returns (TokenData[] memory);

        function getReserveConfigurationData(address asset) external view returns (
            uint256 decimals,
            uint256 ltv,
            uint256 liquidationThreshold,
            uint256 liquidationBonus,
            uint256 reserveFactor,
            bool usageAsCollateralEnabled,
            bool borrowingEnabled,
            bool stableBorrowRateEnabled,
            bool isActive,
            bool isFrozen
        );

        function getReserveTokensAddresses(address asset) external view returns (
            address aTokenAddress,
            address stableDebtTokenAddress,
            address variableDebtTokenAddress
        );

        function getUserReserveData(address asset, address user) external view returns (
            uint256 currentATokenBalance,
            uint256 currentStableDebt,
            uint256 currentVariableDebt,
            uint256 principalStableDebt,
            uint256 scaledVariableDebt,
            uint256 stableBorrowRate,
            uint256 liquidityRate,
            uint256 stableRateLastUpdated,
            bool usageAsCollateralEnabled
        );
    }

    /// `{symbol, tokenAddress}` pair from `getAllReservesTokens`.
    #[derive(Debug)]
    pub struct TokenData {
        string symbol;
        address tokenAddress;
    }

    /// Chainlink-style price oracle, numéraire-denominated.
    #[sol(rpc)]
    pub interface IPriceOracle {
        function getAssetPrice(address asset) external view returns (uint256);
    }

    /// The on-chain liquidator wrapper this bot calls into (out of scope
    /// per spec §1; only its `liquidate` entry point is invoked here).
    #[sol(rpc)]
    pub interface ILiquidatorForAave {
        function liquidate(
            address borrower,
            address debtAToken,
            address collateralAToken,
            uint256 repayAmount,
            uint24 swapFee
        ) external returns (uint256);
    }
}

use crate::signer::TransactionSender;
use std::sync::Arc;

/// Wrapper around the deployed `LiquidatorForAave` contract, pairing the
/// ABI encoder with a [`TransactionSender`] for submission.
pub struct LiquidatorContract {
    pub address: Address,
    sender: Arc<TransactionSender>,
}

impl LiquidatorContract {
    pub fn new(address: Address, sender: Arc<TransactionSender>) -> Self {
        Self { address, sender }
    }

    /// ABI-encode a `liquidate(...)` call.
    pub fn encode_liquidate(
        &self,
        borrower: Address,
        debt_a_token: Address,
        collateral_a_token: Address,
        repay_amount: U256,
        swap_fee: u32,
    ) -> Bytes {
        let call = ILiquidatorForAave::liquidateCall {
            borrower,
            debtAToken: debt_a_token,
            collateralAToken: collateral_a_token,
            repayAmount: repay_amount,
            swapFee: alloy::primitives::Uint::<24, 1>::from(swap_fee & 0xFF_FFFF),
        };
        Bytes::from(call.abi_encode())
    }

    /// Submit the liquidation at a given gas price, gas limit 28,000,000
    /// per spec §4.5. Returns the submitted transaction's hash and nonce
    /// so the mempool watchdog can re-sign it at a bumped price.
    pub async fn liquidate(
        &self,
        borrower: Address,
        debt_a_token: Address,
        collateral_a_token: Address,
        repay_amount: U256,
        swap_fee: u32,
        gas_price_wei: u128,
        gas_limit: u64,
    ) -> anyhow::Result<crate::signer::SubmittedTx> {
        let calldata =
            self.encode_liquidate(borrower, debt_a_token, collateral_a_token, repay_amount, swap_fee);
        self.sender
            .send_transaction_at_gas_price(self.address, calldata, gas_price_wei, gas_limit)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_liquidate_call() {
        let sender = Arc::new(TransactionSender::dummy_for_encoding_tests());
        let contract = LiquidatorContract::new(Address::ZERO, sender);
        let calldata = contract.encode_liquidate(
            Address::repeat_byte(1),
            Address::repeat_byte(2),
            Address::repeat_byte(3),
            U256::from(500u64),
            500,
        );
        assert!(!calldata.is_empty());
        // Selector is the first 4 bytes of the call.
        assert_eq!(&calldata[0..4], &ILiquidatorForAave::liquidateCall::SELECTOR);
    }
}
