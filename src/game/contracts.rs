//! ABI bindings for the dispute game factory and the fault dispute game
//! implementation. Only the read-only surface used for discovery and
//! prestate validation is declared.

use alloy::sol;

sol! {
    interface IDisputeGameFactory {
        function gameCount() external view returns (uint256 gameCount_);
        function gameAtIndex(uint256 _index) external view returns (uint32 gameType_, uint64 timestamp_, address proxy_);
        function gameImpls(uint32 _gameType) external view returns (address impl_);
    }

    interface IFaultDisputeGame {
        function absolutePrestate() external view returns (bytes32 absolutePrestate_);
    }
}
