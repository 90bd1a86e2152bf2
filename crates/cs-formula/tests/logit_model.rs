//! End-to-end: a three-alternative mode-choice model deserialized from its
//! wire encoding, evaluated against the closed-form logit expressions.

use approx::assert_relative_eq;
use cs_expr::Context;
use cs_formula::Formula;

/// Utilities shared by every test: V_train and V_car are linear in time and
/// cost, V_sm adds an alternative-specific constant; car availability comes
/// from the data, the chosen alternative too.
fn mode_choice_model() -> Formula {
    Formula::parse(&[
        "<Beta>{1}\"b_time\"[0]",
        "<Beta>{2}\"b_cost\"[1]",
        "<Beta>{3}\"asc_sm\"[2]",
        "<Variable>{4}\"train_tt\"[0]",
        "<Variable>{5}\"train_co\"[1]",
        "<Variable>{6}\"sm_tt\"[2]",
        "<Variable>{7}\"sm_co\"[3]",
        "<Variable>{8}\"car_tt\"[4]",
        "<Variable>{9}\"car_co\"[5]",
        "<Variable>{10}\"choice\"[6]",
        "<Variable>{11}\"car_av\"[7]",
        "<Times>{12}(2),1,4",
        "<Times>{13}(2),2,5",
        "<Plus>{14}(2),12,13",
        "<Times>{15}(2),1,6",
        "<Times>{16}(2),2,7",
        "<bioMultSum>{17}(3),3,15,16",
        "<Times>{18}(2),1,8",
        "<Times>{19}(2),2,9",
        "<Plus>{20}(2),18,19",
        "<Numeric>{21},1",
        "<bioLogLogit>{22}(3),10,1,14,21,2,17,21,3,20,11",
    ])
    .unwrap()
}

const PARAMS: [f64; 3] = [-0.8, -0.6, 0.3];

//                          t_tt t_co s_tt s_co c_tt c_co choice car_av
const ROW_ALL: [f64; 8] = [1.2, 0.8, 0.9, 1.1, 1.0, 0.5, 2.0, 1.0];
const ROW_NO_CAR: [f64; 8] = [1.2, 0.8, 0.9, 1.1, 1.0, 0.5, 2.0, 0.0];

fn utilities(p: &[f64], row: &[f64]) -> [f64; 3] {
    [
        p[0] * row[0] + p[1] * row[1],
        p[2] + p[0] * row[2] + p[1] * row[3],
        p[0] * row[4] + p[1] * row[5],
    ]
}

#[test]
fn log_probability_matches_the_closed_form() {
    let f = mode_choice_model();
    let data = vec![ROW_ALL.to_vec()];
    let ctx = Context::new(&PARAMS, &[]).with_data(&data).at_row(0);

    let v = utilities(&PARAMS, &ROW_ALL);
    let expected = v[1] - (v[0].exp() + v[1].exp() + v[2].exp()).ln();
    assert_relative_eq!(f.value(&ctx).unwrap(), expected, epsilon = 1e-12);
}

#[test]
fn unavailable_alternative_leaves_the_choice_set() {
    let f = mode_choice_model();
    let data = vec![ROW_NO_CAR.to_vec()];
    let ctx = Context::new(&PARAMS, &[]).with_data(&data).at_row(0);

    let v = utilities(&PARAMS, &ROW_NO_CAR);
    let expected = v[1] - (v[0].exp() + v[1].exp()).ln();
    assert_relative_eq!(f.value(&ctx).unwrap(), expected, epsilon = 1e-12);
}

#[test]
fn gradient_matches_finite_differences() {
    let f = mode_choice_model();
    let data = vec![ROW_ALL.to_vec()];
    let ids = [0_usize, 1, 2];
    let ctx = Context::new(&PARAMS, &[]).with_data(&data).at_row(0);
    let out = f.evaluate(&ctx, &ids, true, true).unwrap();

    let step = 1e-6;
    let value_at = |p: &[f64]| {
        let ctx = Context::new(p, &[]).with_data(&data).at_row(0);
        f.value(&ctx).unwrap()
    };
    let grad = out.gradient.as_deref().unwrap();
    for k in 0..3 {
        let mut up = PARAMS.to_vec();
        up[k] += step;
        let mut down = PARAMS.to_vec();
        down[k] -= step;
        let fd = (value_at(&up) - value_at(&down)) / (2.0 * step);
        assert_relative_eq!(grad[k], fd, epsilon = 1e-6, max_relative = 1e-6);
    }

    // the Hessian of a logit log-probability is symmetric negative
    // semidefinite; check symmetry and the diagonal sign
    let hess = out.hessian.as_ref().unwrap();
    for k in 0..3 {
        assert!(hess[k][k] <= 0.0);
        for l in 0..3 {
            assert_eq!(hess[k][l], hess[l][k]);
        }
    }
}

#[test]
fn betas_are_shared_across_utilities() {
    let f = mode_choice_model();
    // 22 units, all with distinct identifiers: 22 nodes, no duplicates of
    // the betas referenced from three utilities each
    assert_eq!(f.node_count(), 22);
    assert_eq!(f.parameter_index("b_time"), Some(0));
    assert_eq!(f.parameter_index("b_cost"), Some(1));
    assert_eq!(f.parameter_index("asc_sm"), Some(2));
}

#[test]
fn fixed_parameters_read_past_the_free_vector() {
    // asc_sm pinned: literal id 2 with only two free parameters reads
    // fixed_parameters[0]
    let f = mode_choice_model();
    let free = [-0.8, -0.6];
    let fixed = [0.3];
    let data = vec![ROW_ALL.to_vec()];
    let ctx = Context::new(&free, &fixed).with_data(&data).at_row(0);

    let v = utilities(&PARAMS, &ROW_ALL);
    let expected = v[1] - (v[0].exp() + v[1].exp() + v[2].exp()).ln();
    assert_relative_eq!(f.value(&ctx).unwrap(), expected, epsilon = 1e-12);
}
