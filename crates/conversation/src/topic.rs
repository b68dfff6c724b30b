use serde::{Deserialize, Serialize};

/// The lesson a conversation is about. Only its label and description reach
/// the model; the id picks topic-specific wording in fallback explanations.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Topic {
    pub id: String,
    pub name: String,
    pub description: String,
}

const TOPICS: &[(&str, &str, &str)] = &[
    (
        "intro",
        "Introduction to DeFi",
        "DeFi (Decentralized Finance) is an ecosystem of financial applications built on blockchain networks. It aims to recreate traditional financial systems in a decentralized way, removing intermediaries.",
    ),
    (
        "lending",
        "Lending & Borrowing",
        "Lending and borrowing platforms allow users to lend their cryptocurrencies and earn interest or borrow assets by providing collateral.",
    ),
    (
        "dex",
        "Decentralized Exchanges",
        "Decentralized exchanges (DEXs) allow users to trade cryptocurrencies directly from their wallets without the need for an intermediary.",
    ),
    (
        "staking",
        "Staking & Yield Farming",
        "Staking involves locking up cryptocurrencies to support network operations and earn rewards. Yield farming involves strategically providing liquidity to maximize returns.",
    ),
    (
        "nft",
        "NFTs & Marketplaces",
        "Non-Fungible Tokens (NFTs) represent ownership of unique items. NFT marketplaces facilitate buying, selling, and trading of these digital assets.",
    ),
    (
        "dao",
        "DAOs & Governance",
        "Decentralized Autonomous Organizations (DAOs) are community-led entities with no central authority. Governance tokens give holders voting rights in these organizations.",
    ),
    (
        "wallets",
        "Wallets & Security",
        "Cryptocurrency wallets store private keys needed to access and manage your digital assets. Security practices are critical to protect your holdings.",
    ),
    (
        "defi2",
        "DeFi 2.0 & Beyond",
        "DeFi 2.0 refers to the next generation of DeFi protocols that address limitations of the first wave, focusing on sustainability, capital efficiency, and risk management.",
    ),
];

impl Topic {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: description.into(),
        }
    }

    /// What a conversation is about before any lesson is picked.
    pub fn general() -> Self {
        Self::new("defi", "DeFi", "Decentralized Finance in general.")
    }

    /// Built-in lessons, in menu order.
    pub fn builtin() -> Vec<Topic> {
        TOPICS
            .iter()
            .map(|(id, name, description)| Topic::new(*id, *name, *description))
            .collect()
    }

    pub fn find(id: &str) -> Option<Topic> {
        Self::builtin().into_iter().find(|topic| topic.id == id)
    }

    pub fn context_line(&self) -> String {
        format!("We are discussing {}. {}", self.name, self.description)
    }

    /// First assistant message after the learner picks this topic.
    pub fn greeting(&self) -> String {
        format!("Let's explore {}. {}", self.name, self.description)
    }
}

impl Default for Topic {
    fn default() -> Self {
        Self::general()
    }
}
