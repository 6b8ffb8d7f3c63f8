pub mod membership_changer;
