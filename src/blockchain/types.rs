// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Blockchain types and constants.

/// Avalanche network configuration.
#[derive(Debug, Clone)]
pub struct NetworkConfig {
    /// Short identifier used in configuration (`fuji`, `mainnet`)
    pub id: &'static str,
    /// Network name for display
    pub name: &'static str,
    /// Chain ID
    pub chain_id: u64,
    /// Block explorer URL
    pub explorer_url: &'static str,
}

impl NetworkConfig {
    /// Explorer link for a transaction hash.
    pub fn explorer_tx_url(&self, tx_hash: &str) -> String {
        format!("{}/tx/{}", self.explorer_url, tx_hash)
    }
}

/// Avalanche C-Chain Mainnet configuration.
pub const AVAX_MAINNET: NetworkConfig = NetworkConfig {
    id: "mainnet",
    name: "Avalanche C-Chain",
    chain_id: 43114,
    explorer_url: "https://snowtrace.io",
};

/// Avalanche Fuji Testnet configuration.
pub const AVAX_FUJI: NetworkConfig = NetworkConfig {
    id: "fuji",
    name: "Avalanche Fuji Testnet",
    chain_id: 43113,
    explorer_url: "https://testnet.snowtrace.io",
};

/// Resolve a network from its configuration identifier.
pub fn network_by_id(raw: &str) -> Result<NetworkConfig, String> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "fuji" => Ok(AVAX_FUJI),
        "mainnet" => Ok(AVAX_MAINNET),
        other => Err(format!(
            "Unknown network `{other}`, expected `fuji` or `mainnet`."
        )),
    }
}

/// Known ERC-20 tokens on Avalanche.
#[derive(Debug, Clone)]
pub struct Erc20Token {
    pub symbol: &'static str,
    pub name: &'static str,
    pub decimals: u8,
    /// Mainnet contract address
    pub mainnet_address: Option<&'static str>,
    /// Fuji testnet contract address
    pub fuji_address: Option<&'static str>,
}

impl Erc20Token {
    /// Contract address of this token on the given network, if deployed there.
    pub fn address_on(&self, network: &NetworkConfig) -> Option<&'static str> {
        if network.chain_id == AVAX_MAINNET.chain_id {
            self.mainnet_address
        } else {
            self.fuji_address
        }
    }
}

/// Relational Euro (`rEUR`) token deployed on Fuji.
pub const REUR_TOKEN: Erc20Token = Erc20Token {
    symbol: "rEUR",
    name: "Relational Euro",
    decimals: 6,
    mainnet_address: None,
    fuji_address: Some("0x76568BEd5Acf1A5Cd888773C8cAe9ea2a9131A63"),
};

/// USDC for reference/testing.
pub const USDC_TOKEN: Erc20Token = Erc20Token {
    symbol: "USDC",
    name: "USD Coin",
    decimals: 6,
    // Official USDC on Avalanche C-Chain
    mainnet_address: Some("0xB97EF9Ef8734C71904D8002F8b6Bc66Dd9c48a6E"),
    // Fuji testnet USDC (Circle's test token)
    fuji_address: Some("0x5425890298aed601595a70AB815c96711a31Bc65"),
};

/// Tokens with bundled metadata and deployment addresses.
pub const KNOWN_TOKENS: &[Erc20Token] = &[REUR_TOKEN, USDC_TOKEN];

/// Look up a known token by its configured symbol.
pub fn token_by_symbol(symbol: &str) -> Option<&'static Erc20Token> {
    KNOWN_TOKENS
        .iter()
        .find(|token| token.symbol.eq_ignore_ascii_case(symbol.trim()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn network_lookup_normalizes_input() {
        assert_eq!(network_by_id("fuji").unwrap().chain_id, 43113);
        assert_eq!(network_by_id(" Mainnet ").unwrap().chain_id, 43114);
        assert!(network_by_id("goerli").is_err());
    }

    #[test]
    fn token_lookup_is_case_insensitive() {
        assert_eq!(token_by_symbol("reur").unwrap().decimals, 6);
        assert_eq!(token_by_symbol("USDC").unwrap().symbol, "USDC");
        assert!(token_by_symbol("DOGE").is_none());
    }

    #[test]
    fn token_addresses_follow_the_network() {
        assert_eq!(
            REUR_TOKEN.address_on(&AVAX_FUJI),
            Some("0x76568BEd5Acf1A5Cd888773C8cAe9ea2a9131A63")
        );
        assert_eq!(REUR_TOKEN.address_on(&AVAX_MAINNET), None);
        assert!(USDC_TOKEN.address_on(&AVAX_MAINNET).is_some());
    }

    #[test]
    fn explorer_links_point_at_the_transaction() {
        assert_eq!(
            AVAX_FUJI.explorer_tx_url("0xabc"),
            "https://testnet.snowtrace.io/tx/0xabc"
        );
    }
}
