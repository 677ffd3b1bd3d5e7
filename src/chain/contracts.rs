//! Solidity interfaces consumed and produced by the keeper
//!
//! Reads go through `RelayChain`; writes are only ever encoded here and
//! handed back as `{to, data}` pairs.

use alloy_sol_types::sol;

sol! {
    /// Router hop, shared by the router quote and the relay swap functions
    #[derive(Debug, PartialEq, Eq)]
    struct Route {
        address from;
        address to;
        bool stable;
        address factory;
    }

    /// Pool row returned by the sugar `forSwaps` view
    #[derive(Debug)]
    struct SwapLp {
        address lp;
        bool stable;
        address token0;
        address token1;
        address factory;
    }

    /// Claimable reward row returned by the sugar `rewards` view
    #[derive(Debug)]
    struct Reward {
        uint256 venft_id;
        address lp;
        uint256 amount;
        address token;
        address fee;
        address bribe;
    }

    #[derive(Debug)]
    interface IRelayRegistry {
        function getAll() external view returns (address[] memory);
    }

    #[derive(Debug)]
    interface IRelayFactory {
        function relays() external view returns (address[] memory);
        function highLiquidityTokens() external view returns (address[] memory);
    }

    #[derive(Debug)]
    interface IRelay {
        function token() external view returns (address);
        function mTokenId() external view returns (uint256);
        function claimFees(address[] calldata _fees, address[][] calldata _tokens) external;
        function claimBribes(address[] calldata _bribes, address[][] calldata _tokens) external;
        function swapTokenToVELOWithOptionalRoute(address _tokenToSwap, uint256 _slippage, Route[] calldata _optionalRoute) external;
        function swapTokenToTokenWithOptionalRoute(address _tokenToSwap, uint256 _slippage, Route[] calldata _optionalRoute) external;
        function compound() external;
        function multicall(bytes[] calldata data) external returns (bytes[] memory results);
    }

    #[derive(Debug)]
    interface IRouter {
        function getAmountsOut(uint256 amountIn, Route[] memory routes) external view returns (uint256[] memory amounts);
    }

    #[derive(Debug)]
    interface ILpSugar {
        function forSwaps(uint256 _limit, uint256 _offset) external view returns (SwapLp[] memory);
        function rewards(uint256 _limit, uint256 _offset, uint256 _venft_id) external view returns (Reward[] memory);
    }

    #[derive(Debug)]
    interface ILibrary {
        function getTradeDiff(uint256 amountIn, address tokenIn, address tokenOut, bool stable, address factory) external view returns (uint256 a, uint256 b);
    }

    #[derive(Debug)]
    interface IERC20 {
        function balanceOf(address account) external view returns (uint256);
    }

    #[derive(Debug)]
    interface IMinter {
        function updatePeriod() external returns (uint256);
    }

    #[derive(Debug)]
    interface IMinterV1 {
        function update_period() external returns (uint256);
    }

    #[derive(Debug)]
    interface IVoter {
        function length() external view returns (uint256);
        function distribute(uint256 _start, uint256 _finish) external;
    }

    #[derive(Debug)]
    interface ISinkManager {
        function claimRebaseAndGaugeRewards() external;
    }
}
