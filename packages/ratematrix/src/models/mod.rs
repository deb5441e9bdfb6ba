pub mod bdr;
pub mod binary_mutation_coalescent;
pub mod chromosomes;
pub mod chromosomes_ploidy;
pub mod codon_hky;
pub mod codon_state;
pub mod covarion;
pub mod free_k;
pub mod gtr;
pub mod mk1;
pub mod nuc_presets;
pub mod ordered;
pub mod pomo;
pub mod pomo_state;
pub mod reversible_pomo;
pub mod wag;
