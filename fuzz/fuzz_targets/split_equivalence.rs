#![no_main]

use cordyceps_avl::model::SplitEquivalenceInput;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|input: SplitEquivalenceInput| {
    cordyceps_avl::model::run_split_equivalence(input.keys, input.at);
});
