use cordyceps_avl::{AvlMap, MapNode};

fn main() {
    let mut map: AvlMap<&str> = AvlMap::new();

    for (key, value) in [(20, "b"), (10, "a"), (30, "c"), (40, "d"), (50, "e"), (35, "cc")] {
        let ops = map.insert(key, value).unwrap();
        map.assert_invariants();
        println!("insert {key}: {ops} ops, keys {:?}", map.keys().collect::<Vec<_>>());
    }

    let ops = map.delete(10).unwrap();
    map.assert_invariants();
    println!("delete 10: {ops} ops, keys {:?}", map.keys().collect::<Vec<_>>());

    if let Err(err) = map.delete(10) {
        println!("delete 10 again: {err}");
    }

    let (mut low, high) = map.split(35);
    low.assert_invariants();
    high.assert_invariants();
    println!("split at 35: {low:?} | {high:?}");

    let cost = low.join(MapNode::new(35, "cc"), high);
    low.assert_invariants();
    println!("rejoin cost {cost}: {low:?}");

    let mut graph = String::new();
    low.dotgraph("demo", &mut graph).unwrap();
    println!("{graph}");
}
