pub mod campaigns;
pub mod entries;
pub mod referrals;
pub mod winners;
