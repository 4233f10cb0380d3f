//! Typed interface for the DiceGame contract.
//!
//! Only the functions and the one event the client actually uses are
//! declared. Call data goes through the generated bindings; the
//! `DiceRolled` payload is one indexed address plus four static words, so
//! it is decoded by hand from topics/data.

use alloy_primitives::{
    Address,
    B256,
    Bytes,
    U256,
};
use alloy_sol_types::{
    SolCall,
    SolEvent,
    sol,
};

use crate::error::GameError;

sol! {
    interface IDiceGame {
        function deposit() external payable;
        function withdraw(uint256 amount) external;
        function rollDice(uint256 betAmount) external;
        function balances(address player) external view returns (uint256);

        event DiceRolled(
            address indexed player,
            uint256 roll,
            bool win,
            uint256 betAmount,
            uint256 payout
        );
    }
}

pub fn deposit_calldata() -> Bytes {
    IDiceGame::depositCall {}.abi_encode().into()
}

pub fn withdraw_calldata(amount: U256) -> Bytes {
    IDiceGame::withdrawCall { amount }.abi_encode().into()
}

pub fn roll_dice_calldata(bet: U256) -> Bytes {
    IDiceGame::rollDiceCall { betAmount: bet }.abi_encode().into()
}

pub fn balances_calldata(player: Address) -> Bytes {
    IDiceGame::balancesCall { player }.abi_encode().into()
}

/// Topic 0 of the `DiceRolled` event.
pub fn dice_rolled_topic() -> B256 {
    IDiceGame::DiceRolled::SIGNATURE_HASH
}

/// A decoded `DiceRolled` log, still in base units.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DiceRolled {
    pub player: Address,
    pub roll: u8,
    pub win: bool,
    pub bet_amount: U256,
    pub payout: U256,
}

pub fn decode_dice_rolled(topics: &[B256], data: &[u8]) -> Result<DiceRolled, GameError> {
    if topics.len() < 2 || topics[0] != dice_rolled_topic() {
        return Err(codec("log is not a DiceRolled event"));
    }
    if data.len() < 128 {
        return Err(codec("DiceRolled payload shorter than four words"));
    }
    let player = Address::from_slice(&topics[1][12..]);
    let roll_word = U256::from_be_slice(&data[0..32]);
    let roll = u8::try_from(roll_word).map_err(|_| codec("roll does not fit in a die face"))?;
    let win = !U256::from_be_slice(&data[32..64]).is_zero();
    let bet_amount = U256::from_be_slice(&data[64..96]);
    let payout = U256::from_be_slice(&data[96..128]);
    Ok(DiceRolled {
        player,
        roll,
        win,
        bet_amount,
        payout,
    })
}

/// Decodes a call return consisting of a single `uint256` word.
pub fn decode_uint_return(data: &[u8]) -> Result<U256, GameError> {
    if data.len() < 32 {
        return Err(codec("return data shorter than one word"));
    }
    Ok(U256::from_be_slice(&data[0..32]))
}

fn codec(message: &str) -> GameError {
    GameError::GatewayUnreachable(message.to_string())
}
